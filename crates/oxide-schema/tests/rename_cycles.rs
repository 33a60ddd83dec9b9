//! Integration tests for rename ordering.

mod common;

use common::{flush, kinds, postgres_users, statements};
use oxide_schema::prelude::*;

/// `public.t (id, a, b, c)` with a primary key on `id`, still detached.
fn table_abc() -> (DatabaseBuilder, ObjectId, [ObjectId; 3]) {
    let mut db = DatabaseBuilder::new(Box::new(PostgresDialect::new())).unwrap();
    let schema = db.create_schema("public").unwrap();
    let t = db.create_table(schema, "t").unwrap();
    let id = db.create_column(t, "id", SqlType::Integer).unwrap();
    let a = db.create_column(t, "a", SqlType::Text).unwrap();
    let b = db.create_column(t, "b", SqlType::Text).unwrap();
    let c = db.create_column(t, "c", SqlType::Text).unwrap();
    db.set_primary_key(t, "pk_t", &[id]).unwrap();
    (db, t, [a, b, c])
}

fn is_temporary(name: &str, original: &str) -> bool {
    name.starts_with(&format!("__{original}__")) && name.ends_with("__")
}

#[test]
fn test_column_swap_uses_temporary_name() {
    let (mut db, _, [a, b, _]) = table_abc();
    db.attach().unwrap();

    db.set_name(a, "scratch").unwrap();
    db.set_name(b, "a").unwrap();
    db.set_name(a, "b").unwrap();

    let sql = flush(&mut db);
    assert_eq!(sql.len(), 3);

    let prefix = "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"a\" TO \"";
    assert!(sql[0].starts_with(prefix));
    let temporary = sql[0][prefix.len()..].trim_end_matches('"').to_string();
    assert!(is_temporary(&temporary, "a"));

    assert_eq!(
        sql[1],
        "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"b\" TO \"a\""
    );
    assert_eq!(
        sql[2],
        format!("ALTER TABLE \"public\".\"t\" RENAME COLUMN \"{temporary}\" TO \"b\"")
    );
    assert_eq!(kinds(&db), vec![ActionKind::Alter]);
}

#[test]
fn test_rename_chain_runs_from_the_free_end() {
    let (mut db, _, [a, b, c]) = table_abc();
    db.attach().unwrap();

    db.set_name(c, "d").unwrap();
    db.set_name(b, "c").unwrap();
    db.set_name(a, "b").unwrap();

    assert_eq!(
        flush(&mut db),
        vec![
            "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"c\" TO \"d\"".to_string(),
            "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"b\" TO \"c\"".to_string(),
            "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"a\" TO \"b\"".to_string(),
        ]
    );
}

#[test]
fn test_three_cycle_needs_one_temporary_name() {
    let (mut db, _, [a, b, c]) = table_abc();
    db.attach().unwrap();

    // a -> b, b -> c, c -> a
    db.set_name(a, "scratch").unwrap();
    db.set_name(c, "a").unwrap();
    db.set_name(b, "c").unwrap();
    db.set_name(a, "b").unwrap();

    let sql = flush(&mut db);
    assert_eq!(sql.len(), 4);
    assert!(sql[0].starts_with("ALTER TABLE \"public\".\"t\" RENAME COLUMN \"a\" TO \"__a__"));
    assert_eq!(
        sql[1],
        "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"c\" TO \"a\""
    );
    assert_eq!(
        sql[2],
        "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"b\" TO \"c\""
    );
    assert!(sql[3].ends_with("TO \"b\""));
}

#[test]
fn test_renamed_column_is_used_by_later_phases() {
    let (mut db, _, [a, _, _]) = table_abc();
    db.attach().unwrap();

    db.set_name(a, "title").unwrap();
    db.set_nullable(a, false).unwrap();

    assert_eq!(
        flush(&mut db),
        vec![
            "ALTER TABLE \"public\".\"t\" RENAME COLUMN \"a\" TO \"title\"".to_string(),
            "ALTER TABLE \"public\".\"t\" ALTER COLUMN \"title\" SET NOT NULL".to_string(),
        ]
    );
}

#[test]
fn test_table_swap() {
    let mut u = postgres_users();
    let accounts = u.db.create_table(u.schema, "accounts").unwrap();
    let id = u.db.create_column(accounts, "id", SqlType::BigInt).unwrap();
    u.db.set_primary_key(accounts, "pk_accounts", &[id]).unwrap();
    u.db.attach().unwrap();

    u.db.set_name(u.table, "scratch").unwrap();
    u.db.set_name(accounts, "users").unwrap();
    u.db.set_name(u.table, "accounts").unwrap();

    let sql = flush(&mut u.db);
    assert_eq!(sql.len(), 3);
    assert!(sql[0].starts_with("ALTER TABLE \"public\".\"users\" RENAME TO \"__users__"));
    assert_eq!(
        sql[1],
        "ALTER TABLE \"public\".\"accounts\" RENAME TO \"users\""
    );
    assert!(sql[2].starts_with("ALTER TABLE \"public\".\"__users__"));
    assert!(sql[2].ends_with("RENAME TO \"accounts\""));
    assert_eq!(
        kinds(&u.db),
        vec![ActionKind::Rename, ActionKind::Rename, ActionKind::Rename]
    );
}

#[test]
fn test_index_swap_uses_alter_index() {
    let (mut db, t, [a, b, _]) = table_abc();
    let ix_a = db
        .create_index(t, "ix_a", &[IndexColumn::asc(a)], false)
        .unwrap();
    let ix_b = db
        .create_index(t, "ix_b", &[IndexColumn::asc(b)], false)
        .unwrap();
    db.attach().unwrap();

    db.set_name(ix_a, "ix_scratch").unwrap();
    db.set_name(ix_b, "ix_a").unwrap();
    db.set_name(ix_a, "ix_b").unwrap();

    let sql = flush(&mut db);
    assert_eq!(sql.len(), 3);
    assert!(sql[0].starts_with("ALTER INDEX \"public\".\"ix_a\" RENAME TO \"__ix_a__"));
    assert_eq!(sql[1], "ALTER INDEX \"public\".\"ix_b\" RENAME TO \"ix_a\"");
    assert!(sql[2].ends_with("RENAME TO \"ix_b\""));
}

#[test]
fn test_primary_key_rename_is_a_constraint_rename() {
    let (mut db, t, _) = table_abc();
    db.attach().unwrap();

    let pk = db.primary_key(t).unwrap();
    db.set_name(pk, "t_pkey").unwrap();

    assert_eq!(
        flush(&mut db),
        vec!["ALTER TABLE \"public\".\"t\" RENAME CONSTRAINT \"pk_t\" TO \"t_pkey\"".to_string()]
    );
}

#[test]
fn test_rename_onto_removed_table_is_rejected() {
    let mut u = postgres_users();
    let legacy = u.db.create_table(u.schema, "legacy").unwrap();
    let id = u.db.create_column(legacy, "id", SqlType::BigInt).unwrap();
    u.db.set_primary_key(legacy, "pk_legacy", &[id]).unwrap();
    u.db.attach().unwrap();

    u.db.remove(legacy).unwrap();
    u.db.set_name(u.table, "legacy").unwrap();

    assert!(matches!(
        u.db.complete_pending_changes(),
        Err(SchemaError::RenameCycleUnresolved { .. })
    ));
    assert!(statements(&u.db).is_empty());
    assert!(u.db.tracker().has_pending_changes());
}

/// `public.users` with index `x` and `public.orders` with index `y`,
/// attached, returning both indexes.
fn indexed_users_and_orders() -> (common::Users, ObjectId, ObjectId) {
    let mut u = postgres_users();
    let x = u
        .db
        .create_index(u.table, "x", &[IndexColumn::asc(u.id)], false)
        .unwrap();
    let orders = u.db.create_table(u.schema, "orders").unwrap();
    let id = u.db.create_column(orders, "id", SqlType::BigInt).unwrap();
    u.db.set_primary_key(orders, "pk_orders", &[id]).unwrap();
    let y = u
        .db
        .create_index(orders, "y", &[IndexColumn::asc(id)], false)
        .unwrap();
    u.db.attach().unwrap();
    (u, x, y)
}

/// Creates `public.fresh (id)` with an index named `index_name`.
fn create_fresh_table(u: &mut common::Users, index_name: &str) {
    let fresh = u.db.create_table(u.schema, "fresh").unwrap();
    let id = u.db.create_column(fresh, "id", SqlType::BigInt).unwrap();
    u.db.set_primary_key(fresh, "pk_fresh", &[id]).unwrap();
    u.db.create_index(fresh, index_name, &[IndexColumn::asc(id)], false)
        .unwrap();
}

#[test]
fn test_index_chain_across_tables() {
    let (mut u, x, y) = indexed_users_and_orders();

    u.db.set_name(y, "z").unwrap();
    u.db.set_name(x, "y").unwrap();

    assert_eq!(
        flush(&mut u.db),
        vec![
            "ALTER INDEX \"public\".\"y\" RENAME TO \"z\"".to_string(),
            "ALTER INDEX \"public\".\"x\" RENAME TO \"y\"".to_string(),
        ]
    );
    assert_eq!(kinds(&u.db), vec![ActionKind::Rename, ActionKind::Rename]);
}

#[test]
fn test_index_swap_across_tables() {
    let (mut u, x, y) = indexed_users_and_orders();

    u.db.set_name(x, "scratch").unwrap();
    u.db.set_name(y, "x").unwrap();
    u.db.set_name(x, "y").unwrap();

    let sql = flush(&mut u.db);
    assert_eq!(sql.len(), 3);
    let prefix = "ALTER INDEX \"public\".\"x\" RENAME TO \"";
    assert!(sql[0].starts_with(prefix));
    let temporary = sql[0][prefix.len()..].trim_end_matches('"').to_string();
    assert!(is_temporary(&temporary, "x"));
    assert_eq!(sql[1], "ALTER INDEX \"public\".\"y\" RENAME TO \"x\"");
    assert_eq!(
        sql[2],
        format!("ALTER INDEX \"public\".\"{temporary}\" RENAME TO \"y\"")
    );
}

#[test]
fn test_index_rename_precedes_new_table_taking_its_name() {
    let (mut u, x, _) = indexed_users_and_orders();

    u.db.set_name(x, "w").unwrap();
    create_fresh_table(&mut u, "x");

    let sql = flush(&mut u.db);
    assert_eq!(sql.len(), 3);
    assert_eq!(sql[0], "ALTER INDEX \"public\".\"x\" RENAME TO \"w\"");
    assert!(sql[1].starts_with("CREATE TABLE \"public\".\"fresh\""));
    assert_eq!(sql[2], "CREATE INDEX \"x\" ON \"public\".\"fresh\" (\"id\")");
}

#[test]
fn test_removed_index_is_dropped_before_its_name_is_reused() {
    let (mut u, x, _) = indexed_users_and_orders();

    u.db.remove(x).unwrap();
    create_fresh_table(&mut u, "x");

    let sql = flush(&mut u.db);
    assert_eq!(sql.len(), 3);
    assert_eq!(sql[0], "DROP INDEX \"public\".\"x\"");
    assert!(sql[1].starts_with("CREATE TABLE \"public\".\"fresh\""));
    assert_eq!(sql[2], "CREATE INDEX \"x\" ON \"public\".\"fresh\" (\"id\")");
    assert_eq!(kinds(&u.db)[0], ActionKind::Remove);
}
