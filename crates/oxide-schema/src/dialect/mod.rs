//! Dialect-specific DDL rendering.
//!
//! The emission pipeline decides *what* to emit and in which order; a
//! [`DdlDialect`] decides how each statement is spelled. Default method
//! bodies render PostgreSQL-flavoured SQL, so a dialect only overrides what
//! it does differently. The pipeline appends the command boundary after each
//! statement; dialects never do.

mod postgres;
mod sqlite;

use std::fmt;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::aggregator::{AggregationContext, TableDiff};
use crate::definition::{
    CheckDef, ColumnDef, ComputationStorage, DefaultValue, ForeignKeyAction, ForeignKeyDef,
    IndexDef, PrimaryKeyDef, QualifiedName, SortOrder, SqlExpr, SqlType, TableDef, ViewDef,
};
use crate::emitter::AlterationPolicy;
use crate::error::Result;
use crate::object::{ObjectId, ObjectType};

/// One clause of an `ALTER TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterClause {
    /// `DROP CONSTRAINT`.
    DropConstraint {
        /// Kind of the dropped constraint.
        kind: ObjectType,
        /// Constraint name.
        name: String,
    },
    /// `DROP COLUMN`.
    DropColumn {
        /// Column name.
        name: String,
    },
    /// Turns a computed column into a plain one.
    DropExpression {
        /// Column name.
        column: String,
    },
    /// `ADD COLUMN`.
    AddColumn(ColumnDef),
    /// Removes a column default.
    DropDefault {
        /// Column name.
        column: String,
    },
    /// Makes a column NOT NULL.
    SetNotNull {
        /// Column name.
        column: String,
    },
    /// Makes a column nullable.
    DropNotNull {
        /// Column name.
        column: String,
    },
    /// Changes a column type.
    SetDataType {
        /// Column name.
        column: String,
        /// New type.
        sql_type: SqlType,
    },
    /// Sets a column default.
    SetDefault {
        /// Column name.
        column: String,
        /// New default.
        default: DefaultValue,
    },
    /// Adds a primary key.
    AddPrimaryKey(PrimaryKeyDef),
    /// Adds a foreign key.
    AddForeignKey(ForeignKeyDef),
    /// Adds a check constraint.
    AddCheck(CheckDef),
}

/// Trait for dialect-specific DDL generation.
///
/// The trait is object safe; a [`DatabaseBuilder`](crate::DatabaseBuilder)
/// holds its dialect as `Box<dyn DdlDialect>`.
pub trait DdlDialect: fmt::Debug {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns how table alterations are laid out.
    fn alteration_policy(&self) -> AlterationPolicy {
        AlterationPolicy::default()
    }

    /// Maps a [`SqlType`] to the dialect-specific type name.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Value given to a NOT NULL column added to an existing table without
    /// a default of its own.
    fn default_for_type(&self, sql_type: &SqlType) -> DefaultValue;

    /// Returns the identifier quote character.
    fn quote_char(&self) -> char {
        '"'
    }

    /// Quotes an identifier, doubling embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String {
        let q = self.quote_char();
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Quotes a schema-qualified name.
    fn qualified_name(&self, name: &QualifiedName) -> String {
        if name.schema.is_empty() {
            self.quote_identifier(&name.name)
        } else {
            format!(
                "{}.{}",
                self.quote_identifier(&name.schema),
                self.quote_identifier(&name.name)
            )
        }
    }

    /// Renders a default value.
    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Expression(expr) => self.render_expr(expr),
            other => other.to_sql(),
        }
    }

    /// Renders an expression.
    fn render_expr(&self, expr: &SqlExpr) -> String {
        expr.sql().to_string()
    }

    /// Renders a column definition.
    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type)
        );
        if let Some(ref computation) = column.computation {
            let storage = match computation.storage {
                ComputationStorage::Stored => "STORED",
                ComputationStorage::Virtual => "VIRTUAL",
            };
            sql.push_str(&format!(
                " GENERATED ALWAYS AS ({}) {storage}",
                self.render_expr(&computation.expression)
            ));
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if column.computation.is_none() {
            if let Some(ref default) = column.default {
                sql.push_str(" DEFAULT ");
                sql.push_str(&self.render_default(default));
            }
        }
        sql
    }

    /// Renders a primary key constraint.
    fn primary_key_constraint(&self, pk: &PrimaryKeyDef) -> String {
        format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            self.quote_identifier(&pk.name),
            self.identifier_list(&pk.columns)
        )
    }

    /// Renders a foreign key constraint.
    fn foreign_key_constraint(&self, fk: &ForeignKeyDef) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&fk.name),
            self.identifier_list(&fk.columns),
            self.qualified_name(&fk.referenced_table),
            self.identifier_list(&fk.referenced_columns)
        );
        if fk.on_delete != ForeignKeyAction::NoAction {
            sql.push_str(" ON DELETE ");
            sql.push_str(fk.on_delete.to_sql());
        }
        if fk.on_update != ForeignKeyAction::NoAction {
            sql.push_str(" ON UPDATE ");
            sql.push_str(fk.on_update.to_sql());
        }
        sql
    }

    /// Renders a check constraint.
    fn check_constraint(&self, check: &CheckDef) -> String {
        format!(
            "CONSTRAINT {} CHECK ({})",
            self.quote_identifier(&check.name),
            self.render_expr(&check.condition)
        )
    }

    /// Quotes and joins a list of identifiers.
    fn identifier_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Appends CREATE SCHEMA.
    fn append_create_schema(&self, sql: &mut String, name: &str) {
        sql.push_str("CREATE SCHEMA ");
        sql.push_str(&self.quote_identifier(name));
    }

    /// Appends DROP SCHEMA.
    fn append_drop_schema(&self, sql: &mut String, name: &str) {
        sql.push_str("DROP SCHEMA ");
        sql.push_str(&self.quote_identifier(name));
    }

    /// Appends a schema rename.
    fn append_rename_schema(&self, sql: &mut String, from: &str, to: &str) {
        sql.push_str(&format!(
            "ALTER SCHEMA {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        ));
    }

    /// Appends CREATE TABLE with its primary key, checks and foreign keys.
    fn append_create_table(&self, sql: &mut String, table: &TableDef) {
        sql.push_str("CREATE TABLE ");
        sql.push_str(&self.qualified_name(&table.name));
        sql.push_str(" (\n");

        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        lines.push(self.primary_key_constraint(&table.primary_key));
        lines.extend(table.checks.iter().map(|c| self.check_constraint(c)));
        lines.extend(table.foreign_keys.iter().map(|f| self.foreign_key_constraint(f)));

        let lines: Vec<String> = lines.into_iter().map(|l| format!("    {l}")).collect();
        sql.push_str(&lines.join(",\n"));
        sql.push_str("\n)");
    }

    /// Appends DROP TABLE.
    fn append_drop_table(&self, sql: &mut String, name: &QualifiedName) {
        sql.push_str("DROP TABLE ");
        sql.push_str(&self.qualified_name(name));
    }

    /// Appends a table rename.
    fn append_rename_table(&self, sql: &mut String, from: &QualifiedName, to: &str) {
        sql.push_str(&format!(
            "ALTER TABLE {} RENAME TO {}",
            self.qualified_name(from),
            self.quote_identifier(to)
        ));
    }

    /// Appends CREATE VIEW.
    fn append_create_view(&self, sql: &mut String, view: &ViewDef) {
        sql.push_str(&format!(
            "CREATE VIEW {} AS {}",
            self.qualified_name(&view.name),
            self.render_expr(&view.definition)
        ));
    }

    /// Appends DROP VIEW.
    fn append_drop_view(&self, sql: &mut String, name: &QualifiedName) {
        sql.push_str("DROP VIEW ");
        sql.push_str(&self.qualified_name(name));
    }

    /// Appends a view rename.
    fn append_rename_view(&self, sql: &mut String, from: &QualifiedName, to: &str) {
        sql.push_str(&format!(
            "ALTER VIEW {} RENAME TO {}",
            self.qualified_name(from),
            self.quote_identifier(to)
        ));
    }

    /// Appends CREATE INDEX.
    fn append_create_index(&self, sql: &mut String, index: &IndexDef) {
        sql.push_str("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.qualified_name(&index.table));
        sql.push_str(&self.index_body(index));
    }

    /// Renders the column list and filter that follow the indexed table.
    fn index_body(&self, index: &IndexDef) -> String {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| match c.order {
                SortOrder::Asc => self.quote_identifier(&c.name),
                SortOrder::Desc => format!("{} DESC", self.quote_identifier(&c.name)),
            })
            .collect();
        let mut sql = format!(" ({})", columns.join(", "));
        if let Some(ref filter) = index.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_expr(filter));
        }
        sql
    }

    /// Appends DROP INDEX. Indexes live in the schema of their table.
    fn append_drop_index(&self, sql: &mut String, table: &QualifiedName, name: &str) {
        sql.push_str("DROP INDEX ");
        sql.push_str(&self.qualified_name(&QualifiedName::new(table.schema.clone(), name)));
    }

    /// Appends an index rename.
    fn append_rename_index(&self, sql: &mut String, table: &QualifiedName, from: &str, to: &str) {
        sql.push_str(&format!(
            "ALTER INDEX {} RENAME TO {}",
            self.qualified_name(&QualifiedName::new(table.schema.clone(), from)),
            self.quote_identifier(to)
        ));
    }

    /// Appends the `ALTER TABLE <name>` header of a clause statement.
    fn append_alter_table_header(&self, sql: &mut String, table: &QualifiedName) {
        sql.push_str("ALTER TABLE ");
        sql.push_str(&self.qualified_name(table));
    }

    /// Returns false for clauses the dialect cannot express.
    fn supports_alter_clause(&self, _clause: &AlterClause) -> bool {
        true
    }

    /// Appends one clause of an `ALTER TABLE` statement.
    fn append_alter_table_clause(&self, sql: &mut String, clause: &AlterClause) {
        let rendered = match clause {
            AlterClause::DropConstraint { name, .. } => {
                format!("DROP CONSTRAINT {}", self.quote_identifier(name))
            }
            AlterClause::DropColumn { name } => {
                format!("DROP COLUMN {}", self.quote_identifier(name))
            }
            AlterClause::DropExpression { column } => {
                format!("ALTER COLUMN {} DROP EXPRESSION", self.quote_identifier(column))
            }
            AlterClause::AddColumn(column) => {
                format!("ADD COLUMN {}", self.column_definition(column))
            }
            AlterClause::DropDefault { column } => {
                format!("ALTER COLUMN {} DROP DEFAULT", self.quote_identifier(column))
            }
            AlterClause::SetNotNull { column } => {
                format!("ALTER COLUMN {} SET NOT NULL", self.quote_identifier(column))
            }
            AlterClause::DropNotNull { column } => {
                format!("ALTER COLUMN {} DROP NOT NULL", self.quote_identifier(column))
            }
            AlterClause::SetDataType { column, sql_type } => format!(
                "ALTER COLUMN {} SET DATA TYPE {}",
                self.quote_identifier(column),
                self.type_name(sql_type)
            ),
            AlterClause::SetDefault { column, default } => format!(
                "ALTER COLUMN {} SET DEFAULT {}",
                self.quote_identifier(column),
                self.render_default(default)
            ),
            AlterClause::AddPrimaryKey(pk) => format!("ADD {}", self.primary_key_constraint(pk)),
            AlterClause::AddForeignKey(fk) => format!("ADD {}", self.foreign_key_constraint(fk)),
            AlterClause::AddCheck(check) => format!("ADD {}", self.check_constraint(check)),
        };
        sql.push_str(&rendered);
    }

    /// Appends a stand-in for a clause the dialect cannot express.
    fn append_unsupported_alter_clause(
        &self,
        sql: &mut String,
        table: &QualifiedName,
        clause: &AlterClause,
    ) {
        let mut statement = String::new();
        self.append_alter_table_header(&mut statement, table);
        statement.push(' ');
        self.append_alter_table_clause(&mut statement, clause);
        sql.push_str(&format!(
            "-- {} does not support: {statement} (table recreation required)",
            self.name()
        ));
    }

    /// Appends a column rename.
    fn append_rename_column(&self, sql: &mut String, table: &QualifiedName, from: &str, to: &str) {
        sql.push_str(&format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.qualified_name(table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        ));
    }

    /// Appends a constraint rename. Index renames go through
    /// [`append_rename_index`](Self::append_rename_index).
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
            "ALTER TABLE {} RENAME CONSTRAINT {} TO {}",
            self.qualified_name(table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        ));
    }

    /// Classifies an object created in an altered table.
    fn handle_creation(
        &self,
        ctx: &AggregationContext<'_>,
        diff: &mut TableDiff,
        object: ObjectId,
    ) -> Result<()> {
        diff.classify_creation(ctx, object)
    }

    /// Classifies an object removed from an altered table.
    fn handle_removal(
        &self,
        ctx: &AggregationContext<'_>,
        diff: &mut TableDiff,
        object: ObjectId,
    ) -> Result<()> {
        diff.classify_removal(ctx, object)
    }

    /// Classifies a pre-existing object of an altered table with recorded
    /// changes.
    fn handle_modification(
        &self,
        ctx: &AggregationContext<'_>,
        diff: &mut TableDiff,
        object: ObjectId,
    ) -> Result<()> {
        diff.classify_modification(ctx, object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Computation, IndexColumnDef};

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(dialect.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_column_definition() {
        let dialect = PostgresDialect::new();
        let column = ColumnDef {
            name: "name".to_string(),
            sql_type: SqlType::Varchar(255),
            nullable: false,
            default: Some(DefaultValue::String(String::new())),
            computation: None,
        };
        assert_eq!(
            dialect.column_definition(&column),
            "\"name\" VARCHAR(255) NOT NULL DEFAULT ''"
        );
    }

    #[test]
    fn test_computed_column_definition_skips_default() {
        let dialect = PostgresDialect::new();
        let column = ColumnDef {
            name: "total".to_string(),
            sql_type: SqlType::Integer,
            nullable: true,
            default: Some(DefaultValue::Integer(0)),
            computation: Some(Computation::stored(
                SqlExpr::new("price * qty").with_columns(["price", "qty"]),
            )),
        };
        assert_eq!(
            dialect.column_definition(&column),
            "\"total\" INTEGER GENERATED ALWAYS AS (price * qty) STORED"
        );
    }

    #[test]
    fn test_create_table() {
        let dialect = PostgresDialect::new();
        let table = TableDef {
            name: QualifiedName::new("public", "orders"),
            columns: vec![
                ColumnDef {
                    name: "id".to_string(),
                    sql_type: SqlType::BigInt,
                    nullable: false,
                    default: None,
                    computation: None,
                },
                ColumnDef {
                    name: "user_id".to_string(),
                    sql_type: SqlType::BigInt,
                    nullable: true,
                    default: None,
                    computation: None,
                },
            ],
            primary_key: PrimaryKeyDef {
                name: "pk_orders".to_string(),
                columns: vec!["id".to_string()],
            },
            checks: vec![],
            foreign_keys: vec![ForeignKeyDef {
                name: "fk_orders_user".to_string(),
                columns: vec!["user_id".to_string()],
                referenced_table: QualifiedName::new("public", "users"),
                referenced_columns: vec!["id".to_string()],
                on_delete: ForeignKeyAction::Cascade,
                on_update: ForeignKeyAction::NoAction,
            }],
        };

        let mut sql = String::new();
        dialect.append_create_table(&mut sql, &table);
        assert_eq!(
            sql,
            "CREATE TABLE \"public\".\"orders\" (\n    \"id\" BIGINT NOT NULL,\n    \
             \"user_id\" BIGINT,\n    CONSTRAINT \"pk_orders\" PRIMARY KEY (\"id\"),\n    \
             CONSTRAINT \"fk_orders_user\" FOREIGN KEY (\"user_id\") REFERENCES \
             \"public\".\"users\" (\"id\") ON DELETE CASCADE\n)"
        );
    }

    #[test]
    fn test_create_partial_index() {
        let dialect = PostgresDialect::new();
        let index = IndexDef {
            name: "ix_active".to_string(),
            table: QualifiedName::new("public", "users"),
            columns: vec![
                IndexColumnDef {
                    name: "email".to_string(),
                    order: SortOrder::Asc,
                },
                IndexColumnDef {
                    name: "created_at".to_string(),
                    order: SortOrder::Desc,
                },
            ],
            unique: true,
            filter: Some(SqlExpr::new("active").with_columns(["active"])),
        };
        let mut sql = String::new();
        dialect.append_create_index(&mut sql, &index);
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX \"ix_active\" ON \"public\".\"users\" \
             (\"email\", \"created_at\" DESC) WHERE active"
        );
    }

    #[test]
    fn test_rename_constraint_routes_indexes() {
        let dialect = PostgresDialect::new();
        let table = QualifiedName::new("public", "users");

        let mut sql = String::new();
        dialect.append_rename_constraint(&mut sql, &table, ObjectType::Index, "a", "b");
        assert_eq!(sql, "ALTER INDEX \"public\".\"a\" RENAME TO \"b\"");

        let mut sql = String::new();
        dialect.append_rename_constraint(&mut sql, &table, ObjectType::Check, "a", "b");
        assert_eq!(
            sql,
            "ALTER TABLE \"public\".\"users\" RENAME CONSTRAINT \"a\" TO \"b\""
        );
    }

    #[test]
    fn test_alter_clauses() {
        let dialect = PostgresDialect::new();
        let render = |clause: AlterClause| {
            let mut sql = String::new();
            dialect.append_alter_table_clause(&mut sql, &clause);
            sql
        };

        assert_eq!(
            render(AlterClause::SetDataType {
                column: "age".to_string(),
                sql_type: SqlType::BigInt
            }),
            "ALTER COLUMN \"age\" SET DATA TYPE BIGINT"
        );
        assert_eq!(
            render(AlterClause::DropExpression {
                column: "total".to_string()
            }),
            "ALTER COLUMN \"total\" DROP EXPRESSION"
        );
        assert_eq!(
            render(AlterClause::SetDefault {
                column: "active".to_string(),
                default: DefaultValue::Bool(true)
            }),
            "ALTER COLUMN \"active\" SET DEFAULT TRUE"
        );
        assert_eq!(
            render(AlterClause::DropConstraint {
                kind: ObjectType::ForeignKey,
                name: "fk".to_string()
            }),
            "DROP CONSTRAINT \"fk\""
        );
    }
}
