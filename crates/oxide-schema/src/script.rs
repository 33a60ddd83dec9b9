//! JSON migration scripts.
//!
//! A script has a `baseline`, describing the database as it exists, and a
//! list of `changes` to plan DDL for. Objects are addressed by dotted paths:
//! `schema`, `schema.object` (table, view, index or constraint) and
//! `schema.table.column`.
//!
//! ```json
//! {
//!   "baseline": [
//!     { "op": "create_schema", "name": "app" },
//!     { "op": "create_table", "schema": "app", "name": "users" },
//!     { "op": "add_column", "table": "app.users", "name": "id", "type": "BigInt", "nullable": false },
//!     { "op": "set_primary_key", "table": "app.users", "name": "pk_users", "columns": ["id"] }
//!   ],
//!   "changes": [
//!     { "op": "rename", "path": "app.users", "to": "accounts" }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::{BuilderOptions, DatabaseBuilder};
use crate::definition::{Computation, DefaultValue, ForeignKeyAction, SqlExpr, SqlType};
use crate::dialect::DdlDialect;
use crate::emitter::{AlterationPolicy, DdlAction};
use crate::error::{Result, SchemaError};
use crate::object::{IndexColumn, Lookup, ObjectId, ObjectType};
use crate::tracker::TrackerMode;

const fn default_true() -> bool {
    true
}

/// One builder operation of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Create a schema.
    CreateSchema {
        /// Schema name.
        name: String,
    },
    /// Create an empty table.
    CreateTable {
        /// Owning schema.
        schema: String,
        /// Table name.
        name: String,
    },
    /// Add a column to a table.
    AddColumn {
        /// `schema.table` path.
        table: String,
        /// Column name.
        name: String,
        /// Column type.
        #[serde(rename = "type")]
        sql_type: SqlType,
        /// Whether NULL is allowed.
        #[serde(default = "default_true")]
        nullable: bool,
        /// Default value.
        #[serde(default)]
        default: Option<DefaultValue>,
    },
    /// Set or replace the primary key of a table.
    SetPrimaryKey {
        /// `schema.table` path.
        table: String,
        /// Constraint name.
        name: String,
        /// Key column names.
        columns: Vec<String>,
    },
    /// Create an index.
    CreateIndex {
        /// `schema.table` path.
        table: String,
        /// Index name.
        name: String,
        /// Indexed column names, in key order.
        columns: Vec<String>,
        /// Whether the index is unique.
        #[serde(default)]
        unique: bool,
        /// Partial index condition.
        #[serde(default)]
        filter: Option<SqlExpr>,
    },
    /// Create a foreign key.
    CreateForeignKey {
        /// `schema.table` path of the referencing table.
        table: String,
        /// Constraint name.
        name: String,
        /// Referencing column names.
        columns: Vec<String>,
        /// `schema.name` path of a primary key or unique index.
        references: String,
        /// ON DELETE behavior.
        #[serde(default)]
        on_delete: ForeignKeyAction,
        /// ON UPDATE behavior.
        #[serde(default)]
        on_update: ForeignKeyAction,
    },
    /// Create a check constraint.
    CreateCheck {
        /// `schema.table` path.
        table: String,
        /// Constraint name.
        name: String,
        /// Condition.
        condition: SqlExpr,
    },
    /// Create a view.
    CreateView {
        /// Owning schema.
        schema: String,
        /// View name.
        name: String,
        /// Defining query.
        definition: SqlExpr,
        /// `schema.name` paths of the tables and views it reads.
        #[serde(default)]
        sources: Vec<String>,
    },
    /// Rename any object.
    Rename {
        /// Path of the object.
        path: String,
        /// New name.
        to: String,
    },
    /// Change column nullability.
    SetNullable {
        /// `schema.table.column` path.
        column: String,
        /// Whether NULL is allowed.
        nullable: bool,
    },
    /// Change a column type.
    SetDataType {
        /// `schema.table.column` path.
        column: String,
        /// New type.
        #[serde(rename = "type")]
        sql_type: SqlType,
    },
    /// Change or clear a column default.
    SetDefault {
        /// `schema.table.column` path.
        column: String,
        /// New default.
        default: Option<DefaultValue>,
    },
    /// Change or clear a column computation.
    SetComputation {
        /// `schema.table.column` path.
        column: String,
        /// New computation.
        computation: Option<Computation>,
    },
    /// Change index uniqueness.
    SetUnique {
        /// `schema.index` path.
        index: String,
        /// Whether the index is unique.
        unique: bool,
    },
    /// Change or clear an index filter.
    SetFilter {
        /// `schema.index` path.
        index: String,
        /// New filter.
        filter: Option<SqlExpr>,
    },
    /// Change the ON DELETE behavior of a foreign key.
    SetOnDelete {
        /// `schema.constraint` path.
        foreign_key: String,
        /// New behavior.
        action: ForeignKeyAction,
    },
    /// Change the ON UPDATE behavior of a foreign key.
    SetOnUpdate {
        /// `schema.constraint` path.
        foreign_key: String,
        /// New behavior.
        action: ForeignKeyAction,
    },
    /// Remove an object and everything it owns.
    Remove {
        /// Path of the object.
        path: String,
    },
}

impl ScriptStep {
    /// Applies the step to a builder.
    pub fn apply(&self, db: &mut DatabaseBuilder) -> Result<()> {
        match self {
            Self::CreateSchema { name } => {
                db.create_schema(name)?;
            }
            Self::CreateTable { schema, name } => {
                let schema = resolve(db, schema)?;
                db.create_table(schema, name)?;
            }
            Self::AddColumn {
                table,
                name,
                sql_type,
                nullable,
                default,
            } => {
                let table = resolve(db, table)?;
                let column = db.create_column(table, name, sql_type.clone())?;
                db.set_nullable(column, *nullable)?;
                db.set_default(column, default.clone())?;
            }
            Self::SetPrimaryKey {
                table,
                name,
                columns,
            } => {
                let table = resolve(db, table)?;
                let columns = resolve_columns(db, table, columns)?;
                db.set_primary_key(table, name, &columns)?;
            }
            Self::CreateIndex {
                table,
                name,
                columns,
                unique,
                filter,
            } => {
                let table = resolve(db, table)?;
                let columns: Vec<IndexColumn> = resolve_columns(db, table, columns)?
                    .into_iter()
                    .map(IndexColumn::asc)
                    .collect();
                let index = db.create_index(table, name, &columns, *unique)?;
                db.set_filter(index, filter.clone())?;
            }
            Self::CreateForeignKey {
                table,
                name,
                columns,
                references,
                on_delete,
                on_update,
            } => {
                let table = resolve(db, table)?;
                let columns = resolve_columns(db, table, columns)?;
                let referenced = resolve(db, references)?;
                let fk = db.create_foreign_key(table, name, &columns, referenced)?;
                db.set_on_delete(fk, *on_delete)?;
                db.set_on_update(fk, *on_update)?;
            }
            Self::CreateCheck {
                table,
                name,
                condition,
            } => {
                let table = resolve(db, table)?;
                db.create_check(table, name, condition.clone())?;
            }
            Self::CreateView {
                schema,
                name,
                definition,
                sources,
            } => {
                let schema = resolve(db, schema)?;
                let sources = sources
                    .iter()
                    .map(|source| resolve(db, source))
                    .collect::<Result<Vec<_>>>()?;
                db.create_view(schema, name, definition.clone(), &sources)?;
            }
            Self::Rename { path, to } => {
                let id = resolve(db, path)?;
                db.set_name(id, to)?;
            }
            Self::SetNullable { column, nullable } => {
                let id = resolve(db, column)?;
                db.set_nullable(id, *nullable)?;
            }
            Self::SetDataType { column, sql_type } => {
                let id = resolve(db, column)?;
                db.set_data_type(id, sql_type.clone())?;
            }
            Self::SetDefault { column, default } => {
                let id = resolve(db, column)?;
                db.set_default(id, default.clone())?;
            }
            Self::SetComputation {
                column,
                computation,
            } => {
                let id = resolve(db, column)?;
                db.set_computation(id, computation.clone())?;
            }
            Self::SetUnique { index, unique } => {
                let id = resolve(db, index)?;
                db.set_unique(id, *unique)?;
            }
            Self::SetFilter { index, filter } => {
                let id = resolve(db, index)?;
                db.set_filter(id, filter.clone())?;
            }
            Self::SetOnDelete {
                foreign_key,
                action,
            } => {
                let id = resolve(db, foreign_key)?;
                db.set_on_delete(id, *action)?;
            }
            Self::SetOnUpdate {
                foreign_key,
                action,
            } => {
                let id = resolve(db, foreign_key)?;
                db.set_on_update(id, *action)?;
            }
            Self::Remove { path } => {
                let id = resolve(db, path)?;
                db.remove(id)?;
            }
        }
        Ok(())
    }
}

/// A baseline schema plus the changes to plan DDL for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationScript {
    /// Steps describing the existing database.
    #[serde(default)]
    pub baseline: Vec<ScriptStep>,
    /// Steps whose DDL is planned.
    #[serde(default)]
    pub changes: Vec<ScriptStep>,
}

impl MigrationScript {
    /// Parses a script from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a script file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = contents.len(), "loaded migration script");
        Self::from_json(&contents)
    }

    /// Builds the baseline, applies the changes and flushes them.
    ///
    /// The returned builder holds the planned actions.
    pub fn build(
        &self,
        dialect: Box<dyn DdlDialect>,
        policy: Option<AlterationPolicy>,
    ) -> Result<DatabaseBuilder> {
        let mut db = DatabaseBuilder::with_options(
            dialect,
            BuilderOptions {
                mode: TrackerMode::Detached,
                policy,
            },
        )?;
        apply_all(&mut db, "baseline", &self.baseline)?;
        db.attach()?;
        apply_all(&mut db, "changes", &self.changes)?;
        db.complete_pending_changes()?;
        Ok(db)
    }

    /// Plans the DDL for the script's changes using the dialect's policy.
    pub fn plan(&self, dialect: Box<dyn DdlDialect>) -> Result<Vec<DdlAction>> {
        Ok(self.build(dialect, None)?.take_actions())
    }
}

fn apply_all(db: &mut DatabaseBuilder, section: &str, steps: &[ScriptStep]) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        debug!(section, position = index, ?step, "applying script step");
        step.apply(db)?;
    }
    Ok(())
}

/// Resolves a dotted path to a live object.
fn resolve(db: &DatabaseBuilder, path: &str) -> Result<ObjectId> {
    let parts: Vec<&str> = path.split('.').collect();
    let not_found = |kind: ObjectType| SchemaError::NameNotFound {
        kind,
        name: path.to_string(),
    };

    let schema = db.schema(parts[0]).live().ok_or_else(|| not_found(ObjectType::Schema))?;
    match parts.as_slice() {
        [_] => Ok(schema),
        [_, object] => db
            .find_object(schema, object)
            .live()
            .ok_or_else(|| not_found(ObjectType::Table)),
        [_, table, column] => {
            let table = db
                .find_object(schema, table)
                .live()
                .ok_or_else(|| not_found(ObjectType::Table))?;
            match db.find_column(table, column) {
                Lookup::Live(id) => Ok(id),
                Lookup::Removed(_) | Lookup::Missing => Err(not_found(ObjectType::Column)),
            }
        }
        _ => Err(SchemaError::InvalidDefinition {
            object: format!("path '{path}'"),
            message: "expected schema[.object[.column]]".to_string(),
        }),
    }
}

fn resolve_columns(db: &DatabaseBuilder, table: ObjectId, names: &[String]) -> Result<Vec<ObjectId>> {
    names
        .iter()
        .map(|name| {
            db.find_column(table, name)
                .live()
                .ok_or_else(|| SchemaError::NameNotFound {
                    kind: ObjectType::Column,
                    name: name.clone(),
                })
        })
        .collect()
}
