//! Error types for schema building and migration output.

use crate::object::{ObjectId, ObjectType, ReferenceSource};

/// Errors that can occur while building a schema or flushing its changes.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// No object with the given id exists.
    #[error("Object {0} does not exist")]
    ObjectNotFound(ObjectId),

    /// No live object with the given name exists in the namespace.
    #[error("{kind} '{name}' does not exist")]
    NameNotFound {
        /// Kind of object that was looked up.
        kind: ObjectType,
        /// Name that was looked up.
        name: String,
    },

    /// The object was removed and only remains addressable until the next flush.
    #[error("{object} is removed and pending flush")]
    ObjectRemoved {
        /// Description of the removed object.
        object: String,
    },

    /// The object exists but is of a different kind than the operation requires.
    #[error("Expected {expected} but {object} is a {actual}")]
    UnexpectedObjectType {
        /// Description of the object.
        object: String,
        /// Kind the operation required.
        expected: ObjectType,
        /// Actual kind of the object.
        actual: ObjectType,
    },

    /// Removal is blocked by a live object that still depends on the target.
    #[error("Cannot remove {object}: still referenced by {referencer} ({reason})")]
    BlockingReference {
        /// Description of the object being removed.
        object: String,
        /// Description of the live object that blocks the removal.
        referencer: String,
        /// Why the referencer depends on the object.
        reason: ReferenceSource,
    },

    /// A name is already taken in the target namespace.
    #[error("Name '{name}' is already taken by {existing}")]
    NameConflict {
        /// The conflicting name.
        name: String,
        /// Description of the object that holds the name.
        existing: String,
    },

    /// Pending renames could not be ordered.
    #[error("Rename of '{name}' could not be resolved: {message}")]
    RenameCycleUnresolved {
        /// Target name of the rename that failed.
        name: String,
        /// Details about the failure.
        message: String,
    },

    /// A table is about to be created or altered without a primary key.
    #[error("Table '{table}' has no primary key")]
    MissingPrimaryKey {
        /// Name of the table.
        table: String,
    },

    /// The requested object definition is invalid.
    #[error("Invalid definition for {object}: {message}")]
    InvalidDefinition {
        /// Description of the object.
        object: String,
        /// What is wrong with it.
        message: String,
    },

    /// The dialect configuration is invalid.
    #[error("Invalid dialect configuration: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (reading migration scripts).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
