//! Integration tests for planning JSON migration scripts from disk.

use std::io::Write;

use oxide_schema::prelude::*;
use tempfile::NamedTempFile;

const SCRIPT: &str = r#"{
    "baseline": [
        { "op": "create_schema", "name": "app" },
        { "op": "create_table", "schema": "app", "name": "users" },
        { "op": "add_column", "table": "app.users", "name": "id", "type": "BigInt", "nullable": false },
        { "op": "add_column", "table": "app.users", "name": "email", "type": "Text" },
        { "op": "set_primary_key", "table": "app.users", "name": "pk_users", "columns": ["id"] },
        { "op": "create_table", "schema": "app", "name": "orders" },
        { "op": "add_column", "table": "app.orders", "name": "id", "type": "BigInt", "nullable": false },
        { "op": "add_column", "table": "app.orders", "name": "user_id", "type": "BigInt" },
        { "op": "set_primary_key", "table": "app.orders", "name": "pk_orders", "columns": ["id"] },
        {
            "op": "create_foreign_key",
            "table": "app.orders",
            "name": "fk_orders_user",
            "columns": ["user_id"],
            "references": "app.pk_users"
        }
    ],
    "changes": [
        { "op": "rename", "path": "app.users", "to": "accounts" },
        { "op": "add_column", "table": "app.accounts", "name": "active", "type": "Boolean", "nullable": false },
        { "op": "create_index", "table": "app.accounts", "name": "ix_accounts_email", "columns": ["email"], "unique": true }
    ]
}"#;

fn script_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn plan(dialect: Box<dyn DdlDialect>) -> Vec<String> {
    let file = script_file(SCRIPT);
    let script = MigrationScript::from_path(file.path()).unwrap();
    script
        .plan(dialect)
        .unwrap()
        .iter()
        .flat_map(DdlAction::statements)
        .map(str::to_string)
        .collect()
}

#[test]
fn test_plan_postgres_script() {
    assert_eq!(
        plan(Box::new(PostgresDialect::new())),
        vec![
            "ALTER TABLE \"app\".\"users\" RENAME TO \"accounts\"".to_string(),
            "ALTER TABLE \"app\".\"accounts\" ADD COLUMN \"active\" BOOLEAN NOT NULL DEFAULT FALSE"
                .to_string(),
            "CREATE UNIQUE INDEX \"ix_accounts_email\" ON \"app\".\"accounts\" (\"email\")"
                .to_string(),
        ]
    );
}

#[test]
fn test_plan_sqlite_script() {
    assert_eq!(
        plan(Box::new(SqliteDialect::new())),
        vec![
            "ALTER TABLE \"app\".\"users\" RENAME TO \"accounts\"".to_string(),
            "ALTER TABLE \"app\".\"accounts\" ADD COLUMN \"active\" INTEGER NOT NULL DEFAULT 0"
                .to_string(),
            "CREATE UNIQUE INDEX \"app\".\"ix_accounts_email\" ON \"accounts\" (\"email\")"
                .to_string(),
        ]
    );
}

#[test]
fn test_removing_referenced_table_is_blocked() {
    let mut script = MigrationScript::from_json(SCRIPT).unwrap();
    script.changes = vec![ScriptStep::Remove {
        path: "app.users".to_string(),
    }];
    let err = script.plan(Box::new(PostgresDialect::new())).unwrap_err();
    assert!(matches!(err, SchemaError::BlockingReference { .. }));
    assert!(err.to_string().contains("foreign key 'fk_orders_user'"));
}

#[test]
fn test_missing_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = MigrationScript::from_path(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, SchemaError::Io(_)));
}
