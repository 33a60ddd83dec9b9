//! Schema building with change tracking and ordered DDL output.
//!
//! `oxide-schema` keeps an in-memory model of a database (schemas, tables,
//! columns, indexes, constraints and views), records every change made to
//! it, and turns the recorded changes into a correctly ordered migration
//! script for a SQL dialect.
//!
//! # Architecture
//!
//! - **Graph** - Arena of objects with ownership collections and reference
//!   edges; removal cascades over owned objects and is blocked by live
//!   referencers
//! - **Tracker** - Records the original value of every changed property
//!   while attached
//! - **Aggregator** - Folds the records of one table into a [`TableDiff`]
//! - **Rename resolver** - Orders renames, breaking cycles with temporary
//!   names
//! - **Emitter** - Drives a [`DdlDialect`] through the flush order and the
//!   table alteration phases
//!
//! # Example
//!
//! ```rust
//! use oxide_schema::prelude::*;
//!
//! let mut db = DatabaseBuilder::new(Box::new(PostgresDialect::new()))?;
//! let schema = db.create_schema("public")?;
//! let users = db.create_table(schema, "users")?;
//! let id = db.create_column(users, "id", SqlType::BigInt)?;
//! db.set_primary_key(users, "pk_users", &[id])?;
//!
//! // Everything above describes the existing database.
//! db.attach()?;
//!
//! let email = db.create_column(users, "email", SqlType::Text)?;
//! db.set_nullable(email, false)?;
//! db.set_name(users, "accounts")?;
//! db.complete_pending_changes()?;
//!
//! assert_eq!(
//!     db.sql(),
//!     "ALTER TABLE \"public\".\"users\" RENAME TO \"accounts\";\n\
//!      ALTER TABLE \"public\".\"accounts\" ADD COLUMN \"email\" TEXT NOT NULL DEFAULT '';\n"
//! );
//! # Ok::<(), oxide_schema::SchemaError>(())
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the DDL for a migration script
//! oxide-schema plan migration.json
//!
//! # Same, for SQLite with one clause per statement
//! oxide-schema --dialect sqlite plan migration.json
//!
//! # Validate a script and count its actions
//! oxide-schema check migration.json
//! ```

pub mod aggregator;
pub mod database;
pub mod definition;
pub mod dialect;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod object;
pub mod rename;
pub mod script;
pub mod tracker;

pub use aggregator::{aggregate, AggregationContext, ColumnModification, TableDiff};
pub use database::{BuilderOptions, DatabaseBuilder};
pub use dialect::{AlterClause, DdlDialect, PostgresDialect, SqliteDialect};
pub use emitter::{ActionKind, AlterPhase, AlterationPolicy, DdlAction, COMMAND_BOUNDARY};
pub use error::{Result, SchemaError};
pub use object::{Lookup, ObjectId, ObjectType};
pub use script::{MigrationScript, ScriptStep};
pub use tracker::TrackerMode;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::database::{BuilderOptions, DatabaseBuilder};
    pub use crate::definition::{
        Computation, ComputationStorage, DefaultValue, ForeignKeyAction, SortOrder, SqlExpr,
        SqlType,
    };
    pub use crate::dialect::{DdlDialect, PostgresDialect, SqliteDialect};
    pub use crate::emitter::{ActionKind, AlterPhase, AlterationPolicy, DdlAction};
    pub use crate::error::{Result, SchemaError};
    pub use crate::object::{IndexColumn, Lookup, ObjectId, ObjectType};
    pub use crate::script::{MigrationScript, ScriptStep};
    pub use crate::tracker::TrackerMode;
}
