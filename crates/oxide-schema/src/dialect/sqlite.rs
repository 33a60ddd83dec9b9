//! SQLite dialect.
//!
//! SQLite's `ALTER TABLE` only knows how to rename tables and columns and
//! to add or drop columns. Everything else needs a table rebuild, which is
//! out of reach for a statement-by-statement migration; such clauses are
//! emitted as comments so the script still documents the intended change.

use super::{AlterClause, DdlDialect};
use crate::definition::{ComputationStorage, DefaultValue, IndexDef, QualifiedName, SqlExpr, SqlType};
use crate::emitter::AlterationPolicy;
use crate::object::ObjectType;

/// SQLite dialect for DDL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DdlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn alteration_policy(&self) -> AlterationPolicy {
        AlterationPolicy::single_clause()
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        // SQLite has dynamic typing with type affinity
        match sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Real | SqlType::Double | SqlType::Decimal(..) => "REAL".to_string(),
            SqlType::Char(_) | SqlType::Varchar(_) | SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date | SqlType::Time | SqlType::Timestamp => "TEXT".to_string(),
            SqlType::Json | SqlType::Uuid => "TEXT".to_string(),
            SqlType::Boolean => "INTEGER".to_string(), // no bool, use 0/1
        }
    }

    fn default_for_type(&self, sql_type: &SqlType) -> DefaultValue {
        match sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt | SqlType::Boolean => {
                DefaultValue::Integer(0)
            }
            SqlType::Real | SqlType::Double | SqlType::Decimal(..) => DefaultValue::Float(0.0),
            SqlType::Blob => DefaultValue::Expression(SqlExpr::new("X''")),
            SqlType::Date => DefaultValue::String("1970-01-01".to_string()),
            SqlType::Time => DefaultValue::String("00:00:00".to_string()),
            SqlType::Timestamp => DefaultValue::String("1970-01-01 00:00:00".to_string()),
            SqlType::Json => DefaultValue::String("{}".to_string()),
            SqlType::Uuid => {
                DefaultValue::String("00000000-0000-0000-0000-000000000000".to_string())
            }
            SqlType::Char(_) | SqlType::Varchar(_) | SqlType::Text => {
                DefaultValue::String(String::new())
            }
        }
    }

    fn append_create_schema(&self, sql: &mut String, name: &str) {
        sql.push_str(&format!(
            "-- sqlite does not support CREATE SCHEMA {}; attach a database instead",
            self.quote_identifier(name)
        ));
    }

    fn append_drop_schema(&self, sql: &mut String, name: &str) {
        sql.push_str(&format!(
            "-- sqlite does not support DROP SCHEMA {}; detach the database instead",
            self.quote_identifier(name)
        ));
    }

    fn append_rename_schema(&self, sql: &mut String, from: &str, to: &str) {
        sql.push_str(&format!(
            "-- sqlite cannot rename schema {} to {}; re-attach the database under the new name",
            self.quote_identifier(from),
            self.quote_identifier(to)
        ));
    }

    fn append_rename_view(&self, sql: &mut String, from: &QualifiedName, to: &str) {
        sql.push_str(&format!(
            "-- sqlite cannot rename view {} to {}; view recreation required",
            self.qualified_name(from),
            self.quote_identifier(to)
        ));
    }

    fn append_create_index(&self, sql: &mut String, index: &IndexDef) {
        // The schema qualifies the index name, never the table.
        sql.push_str("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.qualified_name(&QualifiedName::new(
            index.table.schema.clone(),
            index.name.clone(),
        )));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(&index.table.name));
        sql.push_str(&self.index_body(index));
    }

    fn append_rename_index(&self, sql: &mut String, table: &QualifiedName, from: &str, to: &str) {
        sql.push_str(&format!(
            "-- sqlite cannot rename index {} to {} on {}; index recreation required",
            self.quote_identifier(from),
            self.quote_identifier(to),
            self.qualified_name(table)
        ));
    }

    fn append_rename_constraint(
        &self,
        sql: &mut String,
        table: &QualifiedName,
        kind: ObjectType,
        from: &str,
        to: &str,
    ) {
        if kind == ObjectType::Index {
            self.append_rename_index(sql, table, from, to);
            return;
        }
        sql.push_str(&format!(
            "-- sqlite cannot rename {kind} {} to {} on {}; table recreation required",
            self.quote_identifier(from),
            self.quote_identifier(to),
            self.qualified_name(table)
        ));
    }

    fn supports_alter_clause(&self, clause: &AlterClause) -> bool {
        match clause {
            // Only VIRTUAL generated columns can be added in place.
            AlterClause::AddColumn(column) => column
                .computation
                .as_ref()
                .is_none_or(|c| c.storage == ComputationStorage::Virtual),
            AlterClause::DropColumn { .. } => true,
            AlterClause::DropConstraint { .. }
            | AlterClause::DropExpression { .. }
            | AlterClause::DropDefault { .. }
            | AlterClause::SetNotNull { .. }
            | AlterClause::DropNotNull { .. }
            | AlterClause::SetDataType { .. }
            | AlterClause::SetDefault { .. }
            | AlterClause::AddPrimaryKey(_)
            | AlterClause::AddForeignKey(_)
            | AlterClause::AddCheck(_) => false,
        }
    }
}
