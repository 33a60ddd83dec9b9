#![allow(dead_code)]

use oxide_schema::prelude::*;

/// A `public.users (id BIGINT NOT NULL, pk_users)` baseline, still detached.
pub struct Users {
    pub db: DatabaseBuilder,
    pub schema: ObjectId,
    pub table: ObjectId,
    pub id: ObjectId,
}

pub fn users(dialect: Box<dyn DdlDialect>) -> Users {
    let mut db = DatabaseBuilder::new(dialect).unwrap();
    let schema = db.create_schema("public").unwrap();
    let table = db.create_table(schema, "users").unwrap();
    let id = db.create_column(table, "id", SqlType::BigInt).unwrap();
    db.set_nullable(id, false).unwrap();
    db.set_primary_key(table, "pk_users", &[id]).unwrap();
    Users {
        db,
        schema,
        table,
        id,
    }
}

pub fn postgres_users() -> Users {
    users(Box::new(PostgresDialect::new()))
}

/// Flushes and returns every emitted statement, without terminators.
pub fn flush(db: &mut DatabaseBuilder) -> Vec<String> {
    db.complete_pending_changes()
        .unwrap_or_else(|e| panic!("Flush failed: {e}"));
    statements(db)
}

pub fn statements(db: &DatabaseBuilder) -> Vec<String> {
    db.actions()
        .iter()
        .flat_map(DdlAction::statements)
        .map(str::to_string)
        .collect()
}

pub fn kinds(db: &DatabaseBuilder) -> Vec<ActionKind> {
    db.actions().iter().map(|a| a.kind).collect()
}
