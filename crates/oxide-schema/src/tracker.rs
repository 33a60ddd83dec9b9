//! Change tracking for builder mutations.
//!
//! While attached, the tracker records the pre-mutation value of every
//! property a setter changes. Only the first original per object and
//! property is kept, so the records always describe the state the database
//! was in when the session started.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::definition::{Computation, DefaultValue, ForeignKeyAction, SqlExpr, SqlType};
use crate::object::ObjectId;

/// Whether mutations are being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackerMode {
    /// Mutations describe state that already exists in the database.
    #[default]
    Detached,
    /// Mutations are recorded and flushed as DDL.
    Attached,
}

/// The property a change record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeDescriptor {
    /// Object name.
    Name,
    /// Removal of the object.
    IsRemoved,
    /// Column nullability.
    IsNullable,
    /// Column data type.
    DataType,
    /// Column default value.
    DefaultValue,
    /// Column computation.
    Computation,
    /// Index uniqueness.
    IsUnique,
    /// Index filter.
    Filter,
    /// Foreign key ON DELETE behavior.
    OnDeleteBehavior,
    /// Foreign key ON UPDATE behavior.
    OnUpdateBehavior,
}

/// An original property value.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeValue {
    /// A name.
    Name(String),
    /// A boolean property (removed, nullable, unique).
    Flag(bool),
    /// A data type.
    DataType(SqlType),
    /// A default value.
    Default(Option<DefaultValue>),
    /// A computation.
    Computation(Option<Computation>),
    /// An index filter.
    Filter(Option<SqlExpr>),
    /// A foreign key behavior.
    Behavior(ForeignKeyAction),
}

impl ChangeValue {
    /// Returns the name, if this is a name value.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the flag, if this is a flag value.
    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Returns the data type, if this is a data type value.
    #[must_use]
    pub fn as_data_type(&self) -> Option<&SqlType> {
        match self {
            Self::DataType(sql_type) => Some(sql_type),
            _ => None,
        }
    }

    /// Returns the default, if this is a default value.
    #[must_use]
    pub fn as_default(&self) -> Option<&Option<DefaultValue>> {
        match self {
            Self::Default(default) => Some(default),
            _ => None,
        }
    }

    /// Returns the computation, if this is a computation value.
    #[must_use]
    pub fn as_computation(&self) -> Option<&Option<Computation>> {
        match self {
            Self::Computation(computation) => Some(computation),
            _ => None,
        }
    }

    /// Returns the filter, if this is a filter value.
    #[must_use]
    pub fn as_filter(&self) -> Option<&Option<SqlExpr>> {
        match self {
            Self::Filter(filter) => Some(filter),
            _ => None,
        }
    }

    /// Returns the behavior, if this is a behavior value.
    #[must_use]
    pub fn as_behavior(&self) -> Option<ForeignKeyAction> {
        match self {
            Self::Behavior(action) => Some(*action),
            _ => None,
        }
    }
}

/// Per-database recorder of property mutations.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    mode: TrackerMode,
    created: BTreeSet<ObjectId>,
    originals: BTreeMap<ObjectId, BTreeMap<ChangeDescriptor, ChangeValue>>,
}

impl ChangeTracker {
    /// Creates a tracker in the given mode.
    #[must_use]
    pub fn new(mode: TrackerMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Returns the current mode.
    #[must_use]
    pub fn mode(&self) -> TrackerMode {
        self.mode
    }

    /// Returns true while mutations are recorded.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.mode == TrackerMode::Attached
    }

    pub(crate) fn set_mode(&mut self, mode: TrackerMode) {
        self.mode = mode;
    }

    /// Marks an object as created during this session.
    pub(crate) fn record_creation(&mut self, object: ObjectId) {
        if self.is_attached() {
            self.created.insert(object);
        }
    }

    /// Records the value a property had before its first mutation.
    pub(crate) fn record_change(
        &mut self,
        object: ObjectId,
        descriptor: ChangeDescriptor,
        original: ChangeValue,
    ) {
        if !self.is_attached() || self.created.contains(&object) {
            return;
        }
        self.originals
            .entry(object)
            .or_default()
            .entry(descriptor)
            .or_insert(original);
    }

    /// Returns true if the object was created during this session.
    #[must_use]
    pub fn is_new(&self, object: ObjectId) -> bool {
        self.created.contains(&object)
    }

    /// Returns the recorded original of a property.
    #[must_use]
    pub fn original(&self, object: ObjectId, descriptor: ChangeDescriptor) -> Option<&ChangeValue> {
        self.originals.get(&object)?.get(&descriptor)
    }

    /// Returns the name the object had before it was renamed.
    #[must_use]
    pub fn original_name(&self, object: ObjectId) -> Option<&str> {
        self.original(object, ChangeDescriptor::Name)?.as_name()
    }

    /// Returns true if a pre-existing object was removed.
    #[must_use]
    pub fn was_removed(&self, object: ObjectId) -> bool {
        self.original(object, ChangeDescriptor::IsRemoved).is_some()
    }

    /// Returns the recorded changes of an object.
    pub fn changes(
        &self,
        object: ObjectId,
    ) -> impl Iterator<Item = (ChangeDescriptor, &ChangeValue)> + '_ {
        self.originals
            .get(&object)
            .into_iter()
            .flatten()
            .map(|(descriptor, value)| (*descriptor, value))
    }

    /// Returns every object created or changed during this session.
    #[must_use]
    pub fn touched(&self) -> BTreeSet<ObjectId> {
        self.created
            .iter()
            .chain(self.originals.keys())
            .copied()
            .collect()
    }

    /// Returns true if anything was recorded since the last flush.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.created.is_empty() || !self.originals.is_empty()
    }

    /// Forgets every record; called after a successful flush.
    pub(crate) fn complete(&mut self) {
        self.created.clear();
        self.originals.clear();
    }
}
