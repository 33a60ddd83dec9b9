//! Value types shared by the builder graph and the dialects.
//!
//! The first half of this module holds the property values stored on
//! builder objects (types, defaults, expressions). The second half holds the
//! name-resolved definitions that the emission pipeline hands to a
//! [`DdlDialect`](crate::dialect::DdlDialect) for rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL data types supported by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Small integer (16-bit).
    SmallInt,
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean.
    Boolean,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Date and time.
    Timestamp,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Binary large object.
    Blob,
    /// JSON data.
    Json,
    /// UUID.
    Uuid,
}

impl SqlType {
    /// Returns true for the integer family.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInt | Self::SmallInt)
    }

    /// Returns true for character types.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Text | Self::Varchar(_) | Self::Char(_))
    }
}

/// An opaque SQL expression.
///
/// The engine never interprets the text. It only compares expressions
/// structurally and tracks the column names they mention so that the
/// columns can be registered as referenced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SqlExpr {
    sql: String,
    #[serde(default)]
    columns: Vec<String>,
}

impl SqlExpr {
    /// Creates an expression that mentions no columns.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            columns: Vec::new(),
        }
    }

    /// Declares the columns (of the owning table) that the expression mentions.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the raw SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the column names the expression mentions.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// SQL expression (e.g., `CURRENT_TIMESTAMP`).
    Expression(SqlExpr),
}

impl DefaultValue {
    /// Returns the generic SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => expr.sql().to_string(),
        }
    }
}

/// Where the value of a computed column lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ComputationStorage {
    /// Computed on read.
    Virtual,
    /// Computed on write and stored.
    #[default]
    Stored,
}

/// Expression of a generated column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Computation {
    /// Generating expression.
    pub expression: SqlExpr,
    /// Storage mode.
    #[serde(default)]
    pub storage: ComputationStorage,
}

impl Computation {
    /// Creates a computation with the given storage mode.
    #[must_use]
    pub fn new(expression: SqlExpr, storage: ComputationStorage) -> Self {
        Self {
            expression,
            storage,
        }
    }

    /// Creates a stored computation.
    #[must_use]
    pub fn stored(expression: SqlExpr) -> Self {
        Self::new(expression, ComputationStorage::Stored)
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Sort order of an index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

// ================================================================
// Definitions handed to dialects
// ================================================================

/// A schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Schema name; empty for the default schema.
    pub schema: String,
    /// Object name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.schema, self.name)
        }
    }
}

/// Definition of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// SQL data type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Generating expression, for computed columns.
    pub computation: Option<Computation>,
}

/// A column of an index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumnDef {
    /// Column name.
    pub name: String,
    /// Sort order.
    pub order: SortOrder,
}

/// Definition of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: QualifiedName,
    /// Indexed columns.
    pub columns: Vec<IndexColumnDef>,
    /// Whether this is a unique index.
    pub unique: bool,
    /// Partial index condition.
    pub filter: Option<SqlExpr>,
}

/// Definition of a primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDef {
    /// Constraint name.
    pub name: String,
    /// Key columns.
    pub columns: Vec<String>,
}

/// Definition of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Constraint name.
    pub name: String,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub referenced_table: QualifiedName,
    /// Referenced column(s).
    pub referenced_columns: Vec<String>,
    /// Action on delete.
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    pub on_update: ForeignKeyAction,
}

/// Definition of a check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDef {
    /// Constraint name.
    pub name: String,
    /// Condition that every row must satisfy.
    pub condition: SqlExpr,
}

/// Complete definition of a table, as rendered by CREATE TABLE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: QualifiedName,
    /// Column definitions.
    pub columns: Vec<ColumnDef>,
    /// Primary key.
    pub primary_key: PrimaryKeyDef,
    /// Check constraints.
    pub checks: Vec<CheckDef>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKeyDef>,
}

/// Definition of a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDef {
    /// View name.
    pub name: QualifiedName,
    /// Query that defines the view.
    pub definition: SqlExpr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_value_to_sql() {
        assert_eq!(DefaultValue::Null.to_sql(), "NULL");
        assert_eq!(DefaultValue::Bool(true).to_sql(), "1");
        assert_eq!(DefaultValue::Integer(42).to_sql(), "42");
        assert_eq!(DefaultValue::String("it's".to_string()).to_sql(), "'it''s'");
        assert_eq!(
            DefaultValue::Expression(SqlExpr::new("CURRENT_TIMESTAMP")).to_sql(),
            "CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_expression_equality_is_structural() {
        let a = SqlExpr::new("price > 0").with_columns(["price"]);
        let b = SqlExpr::new("price > 0").with_columns(["price"]);
        let c = SqlExpr::new("price >= 0").with_columns(["price"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.columns(), &["price".to_string()]);
    }

    #[test]
    fn test_qualified_name_display() {
        assert_eq!(QualifiedName::new("public", "users").to_string(), "public.users");
        assert_eq!(QualifiedName::new("", "users").to_string(), "users");
    }

    #[test]
    fn test_sql_type_deserializes_from_json() {
        let ty: SqlType = serde_json::from_str(r#"{"Varchar": 64}"#).unwrap();
        assert_eq!(ty, SqlType::Varchar(64));
        let ty: SqlType = serde_json::from_str(r#""BigInt""#).unwrap();
        assert!(ty.is_integer());
    }
}
