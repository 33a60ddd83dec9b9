//! Integration tests for flushing tracked changes into DDL.
//!
//! Each test describes an existing database while detached, attaches,
//! mutates the model and checks the emitted statements and their order.

mod common;

use common::{flush, kinds, postgres_users, statements, users};
use oxide_schema::prelude::*;

// =============================================================================
// No-op sessions
// =============================================================================

#[test]
fn test_round_trip_rename_emits_nothing() {
    let mut u = postgres_users();
    u.db.attach().unwrap();

    u.db.set_name(u.id, "user_id").unwrap();
    u.db.set_name(u.id, "id").unwrap();
    u.db.set_name(u.table, "accounts").unwrap();
    u.db.set_name(u.table, "users").unwrap();

    assert_eq!(u.db.complete_pending_changes().unwrap(), 0);
    assert!(u.db.actions().is_empty());
}

#[test]
fn test_create_then_remove_cancels_out() {
    let mut u = postgres_users();
    u.db.attach().unwrap();

    let email = u.db.create_column(u.table, "email", SqlType::Text).unwrap();
    u.db.remove(email).unwrap();
    let audit = u.db.create_table(u.schema, "audit").unwrap();
    u.db.create_column(audit, "id", SqlType::BigInt).unwrap();
    u.db.remove(audit).unwrap();

    assert_eq!(u.db.complete_pending_changes().unwrap(), 0);
    assert_eq!(u.db.find_column(u.table, "email"), Lookup::Missing);
    assert_eq!(u.db.find_object(u.schema, "audit"), Lookup::Missing);
}

#[test]
fn test_second_flush_is_empty() {
    let mut u = postgres_users();
    u.db.attach().unwrap();
    u.db.create_column(u.table, "email", SqlType::Text).unwrap();

    assert_eq!(u.db.complete_pending_changes().unwrap(), 1);
    assert_eq!(u.db.complete_pending_changes().unwrap(), 0);
    assert_eq!(u.db.actions().len(), 1);
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_alter_before_add_before_index() {
    let mut u = postgres_users();
    let age = u.db.create_column(u.table, "age", SqlType::Integer).unwrap();
    u.db.attach().unwrap();

    let email = u.db.create_column(u.table, "email", SqlType::Text).unwrap();
    u.db.create_index(u.table, "ix_users_email", &[IndexColumn::asc(email)], false)
        .unwrap();
    u.db.set_nullable(age, false).unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"age\" SET NOT NULL,\n  \
             ADD COLUMN \"email\" TEXT"
                .to_string(),
            "CREATE INDEX \"ix_users_email\" ON \"public\".\"users\" (\"email\")".to_string(),
        ]
    );
    assert_eq!(kinds(&u.db), vec![ActionKind::Alter]);
}

#[test]
fn test_rename_table_add_column_and_index() {
    let mut db = DatabaseBuilder::new(Box::new(PostgresDialect::new())).unwrap();
    let schema = db.create_schema("public").unwrap();
    let t = db.create_table(schema, "t").unwrap();
    let id = db.create_column(t, "id", SqlType::Integer).unwrap();
    db.set_primary_key(t, "pk_t", &[id]).unwrap();
    db.attach().unwrap();

    let name = db.create_column(t, "name", SqlType::Text).unwrap();
    db.set_nullable(name, false).unwrap();
    db.set_name(t, "t2").unwrap();
    db.create_index(t, "ix_t2_name", &[IndexColumn::asc(name)], false)
        .unwrap();

    assert_eq!(
        flush(&mut db),
        vec![
            "ALTER TABLE \"public\".\"t\" RENAME TO \"t2\"".to_string(),
            "ALTER TABLE \"public\".\"t2\" ADD COLUMN \"name\" TEXT NOT NULL DEFAULT ''"
                .to_string(),
            "CREATE INDEX \"ix_t2_name\" ON \"public\".\"t2\" (\"name\")".to_string(),
        ]
    );
    assert_eq!(kinds(&db), vec![ActionKind::Rename, ActionKind::Alter]);
}

#[test]
fn test_new_table_foreign_key_is_inlined() {
    let mut u = postgres_users();
    u.db.attach().unwrap();

    let orders = u.db.create_table(u.schema, "orders").unwrap();
    let order_id = u.db.create_column(orders, "id", SqlType::BigInt).unwrap();
    let user_id = u.db.create_column(orders, "user_id", SqlType::BigInt).unwrap();
    u.db.set_primary_key(orders, "pk_orders", &[order_id]).unwrap();
    let users_pk = u.db.primary_key(u.table).unwrap();
    let fk = u
        .db
        .create_foreign_key(orders, "fk_orders_user", &[user_id], users_pk)
        .unwrap();
    u.db.set_on_delete(fk, ForeignKeyAction::Cascade).unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "CREATE TABLE \"public\".\"orders\" (\n    \"id\" BIGINT,\n    \
             \"user_id\" BIGINT,\n    CONSTRAINT \"pk_orders\" PRIMARY KEY (\"id\"),\n    \
             CONSTRAINT \"fk_orders_user\" FOREIGN KEY (\"user_id\") REFERENCES \
             \"public\".\"users\" (\"id\") ON DELETE CASCADE\n)"
                .to_string()
        ]
    );
}

#[test]
fn test_drop_view_before_its_table() {
    let mut u = postgres_users();
    let view = u
        .db
        .create_view(
            u.schema,
            "active_users",
            SqlExpr::new("SELECT id FROM public.users"),
            &[u.table],
        )
        .unwrap();
    u.db.attach().unwrap();

    assert!(matches!(
        u.db.remove(u.table),
        Err(SchemaError::BlockingReference { .. })
    ));
    u.db.remove(view).unwrap();
    u.db.remove(u.table).unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "DROP VIEW \"public\".\"active_users\"".to_string(),
            "DROP TABLE \"public\".\"users\"".to_string(),
        ]
    );
    assert_eq!(kinds(&u.db), vec![ActionKind::Remove, ActionKind::Remove]);
}

#[test]
fn test_schema_lifecycle() {
    let mut db = DatabaseBuilder::new(Box::new(PostgresDialect::new())).unwrap();
    let legacy = db.create_schema("legacy").unwrap();
    db.attach().unwrap();

    db.create_schema("reporting").unwrap();
    db.remove(legacy).unwrap();

    assert_eq!(
        flush(&mut db),
        vec![
            "CREATE SCHEMA \"reporting\"".to_string(),
            "DROP SCHEMA \"legacy\"".to_string(),
        ]
    );
}

// =============================================================================
// Reference safety
// =============================================================================

#[test]
fn test_removal_succeeds_once_referencers_are_gone() {
    let mut u = postgres_users();
    let email = u.db.create_column(u.table, "email", SqlType::Text).unwrap();
    let index = u
        .db
        .create_index(u.table, "ix_users_email", &[IndexColumn::asc(email)], false)
        .unwrap();
    u.db.attach().unwrap();

    assert!(matches!(
        u.db.remove(email),
        Err(SchemaError::BlockingReference { .. })
    ));
    u.db.remove(index).unwrap();
    u.db.remove(email).unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "DROP INDEX \"public\".\"ix_users_email\"".to_string(),
            "ALTER TABLE \"public\".\"users\" DROP COLUMN \"email\"".to_string(),
        ]
    );
}

// =============================================================================
// Recreation
// =============================================================================

#[test]
fn test_new_computation_recreates_column_and_check() {
    let mut db = DatabaseBuilder::new(Box::new(PostgresDialect::new())).unwrap();
    let schema = db.create_schema("shop").unwrap();
    let items = db.create_table(schema, "items").unwrap();
    let id = db.create_column(items, "id", SqlType::BigInt).unwrap();
    db.create_column(items, "price", SqlType::Integer).unwrap();
    db.create_column(items, "qty", SqlType::Integer).unwrap();
    let total = db.create_column(items, "total", SqlType::Integer).unwrap();
    db.set_primary_key(items, "pk_items", &[id]).unwrap();
    db.create_check(
        items,
        "ck_items_total",
        SqlExpr::new("total >= 0").with_columns(["total"]),
    )
    .unwrap();
    db.attach().unwrap();

    db.set_computation(
        total,
        Some(Computation::stored(
            SqlExpr::new("price * qty").with_columns(["price", "qty"]),
        )),
    )
    .unwrap();

    assert_eq!(
        flush(&mut db),
        vec![
            "ALTER TABLE \"shop\".\"items\" DROP CONSTRAINT \"ck_items_total\",\n  \
             DROP COLUMN \"total\",\n  \
             ADD COLUMN \"total\" INTEGER GENERATED ALWAYS AS (price * qty) STORED,\n  \
             ADD CONSTRAINT \"ck_items_total\" CHECK (total >= 0)"
                .to_string()
        ]
    );
}

#[test]
fn test_foreign_key_behavior_change_recreates_constraint() {
    let mut u = postgres_users();
    let orders = u.db.create_table(u.schema, "orders").unwrap();
    let order_id = u.db.create_column(orders, "id", SqlType::BigInt).unwrap();
    let user_id = u.db.create_column(orders, "user_id", SqlType::BigInt).unwrap();
    u.db.set_primary_key(orders, "pk_orders", &[order_id]).unwrap();
    let users_pk = u.db.primary_key(u.table).unwrap();
    let fk = u
        .db
        .create_foreign_key(orders, "fk_orders_user", &[user_id], users_pk)
        .unwrap();
    u.db.attach().unwrap();

    u.db.set_on_delete(fk, ForeignKeyAction::Cascade).unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "ALTER TABLE \"public\".\"orders\" DROP CONSTRAINT \"fk_orders_user\",\n  \
             ADD CONSTRAINT \"fk_orders_user\" FOREIGN KEY (\"user_id\") REFERENCES \
             \"public\".\"users\" (\"id\") ON DELETE CASCADE"
                .to_string()
        ]
    );
}

#[test]
fn test_column_changes_follow_sub_order() {
    let mut u = postgres_users();
    let score = u.db.create_column(u.table, "score", SqlType::Integer).unwrap();
    u.db.set_default(score, Some(DefaultValue::Integer(0))).unwrap();
    u.db.attach().unwrap();

    u.db.set_default(score, Some(DefaultValue::Integer(10))).unwrap();
    u.db.set_data_type(score, SqlType::BigInt).unwrap();
    u.db.set_nullable(score, false).unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"score\" DROP DEFAULT,\n  \
             ALTER COLUMN \"score\" SET NOT NULL,\n  \
             ALTER COLUMN \"score\" SET DATA TYPE BIGINT,\n  \
             ALTER COLUMN \"score\" SET DEFAULT 10"
                .to_string()
        ]
    );
}

// =============================================================================
// Policies and dialects
// =============================================================================

fn drop_legacy_add_bio(policy: Option<AlterationPolicy>) -> Vec<String> {
    let mut db = DatabaseBuilder::with_options(
        Box::new(PostgresDialect::new()),
        BuilderOptions {
            mode: TrackerMode::Detached,
            policy,
        },
    )
    .unwrap();
    let schema = db.create_schema("public").unwrap();
    let table = db.create_table(schema, "users").unwrap();
    let id = db.create_column(table, "id", SqlType::BigInt).unwrap();
    let legacy = db.create_column(table, "legacy", SqlType::Text).unwrap();
    db.set_primary_key(table, "pk_users", &[id]).unwrap();
    db.attach().unwrap();

    db.remove(legacy).unwrap();
    db.create_column(table, "bio", SqlType::Text).unwrap();
    flush(&mut db)
}

#[test]
fn test_single_clause_policy_splits_statements() {
    assert_eq!(
        drop_legacy_add_bio(None),
        vec!["ALTER TABLE \"public\".\"users\" DROP COLUMN \"legacy\",\n  \
              ADD COLUMN \"bio\" TEXT"
            .to_string()]
    );
    assert_eq!(
        drop_legacy_add_bio(Some(AlterationPolicy::single_clause())),
        vec![
            "ALTER TABLE \"public\".\"users\" DROP COLUMN \"legacy\"".to_string(),
            "ALTER TABLE \"public\".\"users\" ADD COLUMN \"bio\" TEXT".to_string(),
        ]
    );
}

#[test]
fn test_sqlite_renders_unsupported_steps_as_comments() {
    let mut u = users(Box::new(SqliteDialect::new()));
    let email = u.db.create_column(u.table, "email", SqlType::Text).unwrap();
    u.db.attach().unwrap();

    u.db.set_data_type(email, SqlType::Varchar(320)).unwrap();
    u.db.create_index(u.table, "ix_users_email", &[IndexColumn::asc(email)], false)
        .unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "-- sqlite does not support: ALTER TABLE \"public\".\"users\" ALTER COLUMN \
             \"email\" SET DATA TYPE TEXT (table recreation required)"
                .to_string(),
            "CREATE INDEX \"public\".\"ix_users_email\" ON \"users\" (\"email\")".to_string(),
        ]
    );
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_missing_primary_key_keeps_session_intact() {
    let mut u = postgres_users();
    u.db.attach().unwrap();

    u.db.create_schema("audit").unwrap();
    let log = u.db.create_table(u.schema, "log").unwrap();
    let id = u.db.create_column(log, "id", SqlType::BigInt).unwrap();

    let err = u.db.complete_pending_changes().unwrap_err();
    assert_eq!(err.to_string(), "Table 'public.log' has no primary key");
    assert!(u.db.actions().is_empty());
    assert!(u.db.tracker().has_pending_changes());

    u.db.set_primary_key(log, "pk_log", &[id]).unwrap();
    let sql = flush(&mut u.db);
    assert_eq!(sql.len(), 2);
    assert_eq!(sql[0], "CREATE SCHEMA \"audit\"");
    assert!(sql[1].starts_with("CREATE TABLE \"public\".\"log\""));
}

#[test]
fn test_removing_primary_key_of_altered_table_fails() {
    let mut u = postgres_users();
    u.db.attach().unwrap();

    let pk = u.db.primary_key(u.table).unwrap();
    u.db.remove(pk).unwrap();

    assert!(matches!(
        u.db.complete_pending_changes(),
        Err(SchemaError::MissingPrimaryKey { .. })
    ));
    assert!(statements(&u.db).is_empty());
}
