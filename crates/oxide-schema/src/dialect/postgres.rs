//! PostgreSQL dialect.

use super::DdlDialect;
use crate::definition::{DefaultValue, SqlExpr, SqlType};

/// PostgreSQL dialect for DDL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DdlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            SqlType::Char(n) => format!("CHAR({n})"),
            SqlType::Varchar(n) => format!("VARCHAR({n})"),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BYTEA".to_string(), // PostgreSQL uses BYTEA
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Json => "JSONB".to_string(),
            SqlType::Uuid => "UUID".to_string(),
        }
    }

    fn default_for_type(&self, sql_type: &SqlType) -> DefaultValue {
        match sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => DefaultValue::Integer(0),
            SqlType::Real | SqlType::Double | SqlType::Decimal(..) => DefaultValue::Float(0.0),
            SqlType::Char(_) | SqlType::Varchar(_) | SqlType::Text => {
                DefaultValue::String(String::new())
            }
            SqlType::Boolean => DefaultValue::Bool(false),
            SqlType::Date => DefaultValue::String("1970-01-01".to_string()),
            SqlType::Time => DefaultValue::String("00:00:00".to_string()),
            SqlType::Timestamp => DefaultValue::String("1970-01-01 00:00:00".to_string()),
            SqlType::Blob => DefaultValue::Expression(SqlExpr::new("'\\x'::BYTEA")),
            SqlType::Json => DefaultValue::String("{}".to_string()),
            SqlType::Uuid => {
                DefaultValue::String("00000000-0000-0000-0000-000000000000".to_string())
            }
        }
    }

    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            DefaultValue::Expression(expr) => self.render_expr(expr),
            other => other.to_sql(),
        }
    }
}
