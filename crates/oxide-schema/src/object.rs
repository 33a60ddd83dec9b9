//! Object identity and the per-kind data carried by schema objects.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::definition::{Computation, DefaultValue, ForeignKeyAction, SortOrder, SqlExpr, SqlType};

/// Stable identifier of a schema object.
///
/// Ids come from a monotonic per-database sequence and are never reused,
/// so they stay valid across renames and removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// A database schema (namespace).
    Schema,
    /// A table.
    Table,
    /// A table column.
    Column,
    /// An index.
    Index,
    /// A primary key constraint.
    PrimaryKey,
    /// A foreign key constraint.
    ForeignKey,
    /// A check constraint.
    Check,
    /// A view.
    View,
}

impl ObjectType {
    /// Returns true for objects stored in a table's constraint collection.
    #[must_use]
    pub fn is_constraint(self) -> bool {
        matches!(
            self,
            Self::Index | Self::PrimaryKey | Self::ForeignKey | Self::Check
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Column => "column",
            Self::Index => "index",
            Self::PrimaryKey => "primary key",
            Self::ForeignKey => "foreign key",
            Self::Check => "check",
            Self::View => "view",
        })
    }
}

/// Why one object depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReferenceSource {
    /// An index covers the column.
    IndexColumn,
    /// An index filter mentions the column.
    IndexFilter,
    /// A primary key is backed by the index.
    PrimaryKeyIndex,
    /// A foreign key originates from the column.
    ForeignKeyOrigin,
    /// A foreign key points at the index.
    ForeignKeyTarget,
    /// A check condition mentions the column.
    CheckCondition,
    /// A computed column's expression mentions the column.
    ColumnComputation,
    /// A view reads from the table or view.
    ViewSource,
}

impl fmt::Display for ReferenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IndexColumn => "index column",
            Self::IndexFilter => "index filter",
            Self::PrimaryKeyIndex => "primary key index",
            Self::ForeignKeyOrigin => "foreign key origin",
            Self::ForeignKeyTarget => "foreign key target",
            Self::CheckCondition => "check condition",
            Self::ColumnComputation => "column computation",
            Self::ViewSource => "view source",
        })
    }
}

/// Lifecycle state of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectState {
    /// Part of the model.
    Live,
    /// Removed from the model; still readable for diffing until the next flush.
    PendingRemoval,
    /// Physically detached from its owning collection.
    Purged,
}

/// Result of looking an object up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A live object holds the name.
    Live(ObjectId),
    /// The most recent holder of the name was removed and awaits a flush.
    Removed(ObjectId),
    /// Nothing is known under the name.
    Missing,
}

impl Lookup {
    /// Returns the id of a live object.
    #[must_use]
    pub fn live(self) -> Option<ObjectId> {
        match self {
            Self::Live(id) => Some(id),
            Self::Removed(_) | Self::Missing => None,
        }
    }

    /// Returns the id of a live or removed object.
    #[must_use]
    pub fn id(self) -> Option<ObjectId> {
        match self {
            Self::Live(id) | Self::Removed(id) => Some(id),
            Self::Missing => None,
        }
    }
}

/// Ordered membership of a collection plus its index of live names.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    members: Vec<ObjectId>,
    live: HashMap<String, ObjectId>,
}

impl Collection {
    /// Returns every member that has not been purged, in insertion order.
    #[must_use]
    pub fn members(&self) -> &[ObjectId] {
        &self.members
    }

    /// Returns the live member holding `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.live.get(name).copied()
    }

    pub(crate) fn push(&mut self, id: ObjectId) {
        self.members.push(id);
    }

    pub(crate) fn register(&mut self, name: &str, id: ObjectId) {
        self.live.insert(name.to_string(), id);
    }

    pub(crate) fn unregister(&mut self, name: &str, id: ObjectId) {
        if self.live.get(name) == Some(&id) {
            self.live.remove(name);
        }
    }

    pub(crate) fn detach(&mut self, id: ObjectId) {
        self.members.retain(|member| *member != id);
    }
}

/// A column of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexColumn {
    /// Indexed column.
    pub column: ObjectId,
    /// Sort order.
    pub order: SortOrder,
}

impl IndexColumn {
    /// Indexes `column` in ascending order.
    #[must_use]
    pub fn asc(column: ObjectId) -> Self {
        Self {
            column,
            order: SortOrder::Asc,
        }
    }

    /// Indexes `column` in descending order.
    #[must_use]
    pub fn desc(column: ObjectId) -> Self {
        Self {
            column,
            order: SortOrder::Desc,
        }
    }
}

/// Data of a schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaData {
    /// Tables, views and constraints, sharing one namespace.
    pub objects: Collection,
}

/// Data of a table.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    /// Columns by name.
    pub columns: Collection,
    /// Indexes, primary key, foreign keys and checks.
    pub constraints: Collection,
}

/// Data of a view.
#[derive(Debug, Clone)]
pub struct ViewData {
    /// Query that defines the view.
    pub definition: SqlExpr,
}

/// Data of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    /// SQL data type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Generating expression, for computed columns.
    pub computation: Option<Computation>,
}

/// Data of an index.
#[derive(Debug, Clone)]
pub struct IndexData {
    /// Indexed columns, in key order.
    pub columns: Vec<IndexColumn>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Partial index condition.
    pub filter: Option<SqlExpr>,
    /// True for the implicit index backing a primary key.
    pub is_virtual: bool,
}

/// Data of a primary key.
#[derive(Debug, Clone)]
pub struct PrimaryKeyData {
    /// The virtual unique index backing the key.
    pub index: ObjectId,
}

/// Data of a foreign key.
#[derive(Debug, Clone)]
pub struct ForeignKeyData {
    /// Referencing columns of the owning table.
    pub columns: Vec<ObjectId>,
    /// Unique index of the referenced table.
    pub referenced_index: ObjectId,
    /// Action on delete.
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    pub on_update: ForeignKeyAction,
}

/// Data of a check constraint.
#[derive(Debug, Clone)]
pub struct CheckData {
    /// Condition that every row must satisfy.
    pub condition: SqlExpr,
}

/// Per-kind payload of a schema object.
#[derive(Debug, Clone)]
pub enum ObjectData {
    /// Schema payload.
    Schema(SchemaData),
    /// Table payload.
    Table(TableData),
    /// Column payload.
    Column(ColumnData),
    /// Index payload.
    Index(IndexData),
    /// Primary key payload.
    PrimaryKey(PrimaryKeyData),
    /// Foreign key payload.
    ForeignKey(ForeignKeyData),
    /// Check payload.
    Check(CheckData),
    /// View payload.
    View(ViewData),
}

impl ObjectData {
    /// Returns the kind tag of the payload.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Schema(_) => ObjectType::Schema,
            Self::Table(_) => ObjectType::Table,
            Self::Column(_) => ObjectType::Column,
            Self::Index(_) => ObjectType::Index,
            Self::PrimaryKey(_) => ObjectType::PrimaryKey,
            Self::ForeignKey(_) => ObjectType::ForeignKey,
            Self::Check(_) => ObjectType::Check,
            Self::View(_) => ObjectType::View,
        }
    }
}

/// A node of the builder graph.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    pub(crate) id: ObjectId,
    pub(crate) name: String,
    pub(crate) state: ObjectState,
    pub(crate) owner: Option<ObjectId>,
    pub(crate) data: ObjectData,
}

impl SchemaObject {
    /// Returns the object's id.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the object's current name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the object's kind.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.data.object_type()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ObjectState {
        self.state
    }

    /// Returns true while the object is part of the model.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state == ObjectState::Live
    }

    /// Returns the owning object (schema for tables, views and constraints'
    /// tables; table for columns and constraints). Schemas have no owner.
    #[must_use]
    pub fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    /// Returns the per-kind payload.
    #[must_use]
    pub fn data(&self) -> &ObjectData {
        &self.data
    }

    /// Returns the column payload, if this is a column.
    #[must_use]
    pub fn as_column(&self) -> Option<&ColumnData> {
        match &self.data {
            ObjectData::Column(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the index payload, if this is an index.
    #[must_use]
    pub fn as_index(&self) -> Option<&IndexData> {
        match &self.data {
            ObjectData::Index(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the foreign key payload, if this is a foreign key.
    #[must_use]
    pub fn as_foreign_key(&self) -> Option<&ForeignKeyData> {
        match &self.data {
            ObjectData::ForeignKey(data) => Some(data),
            _ => None,
        }
    }

    /// Returns true for the implicit index backing a primary key.
    #[must_use]
    pub fn is_virtual_index(&self) -> bool {
        self.as_index().is_some_and(|index| index.is_virtual)
    }

    /// Short human-readable description, used in error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.object_type(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_keeps_removed_members_until_detached() {
        let mut collection = Collection::default();
        let a = ObjectId::new(1);
        let b = ObjectId::new(2);
        collection.push(a);
        collection.register("a", a);
        collection.push(b);
        collection.register("b", b);

        collection.unregister("a", a);
        assert_eq!(collection.get("a"), None);
        assert_eq!(collection.members(), &[a, b]);

        collection.detach(a);
        assert_eq!(collection.members(), &[b]);
    }

    #[test]
    fn test_unregister_ignores_other_holder() {
        let mut collection = Collection::default();
        let a = ObjectId::new(1);
        let b = ObjectId::new(2);
        collection.register("x", b);
        collection.unregister("x", a);
        assert_eq!(collection.get("x"), Some(b));
    }

    #[test]
    fn test_lookup_accessors() {
        let id = ObjectId::new(7);
        assert_eq!(Lookup::Live(id).live(), Some(id));
        assert_eq!(Lookup::Removed(id).live(), None);
        assert_eq!(Lookup::Removed(id).id(), Some(id));
        assert_eq!(Lookup::Missing.id(), None);
    }

    #[test]
    fn test_object_type_display() {
        assert_eq!(ObjectType::PrimaryKey.to_string(), "primary key");
        assert!(ObjectType::Check.is_constraint());
        assert!(!ObjectType::Column.is_constraint());
    }
}
