//! Ordering of pending renames within one namespace.
//!
//! Renames are applied one at a time against a model of the names the
//! database currently holds. A rename whose target is taken by another
//! pending rename resolves that one first; when the chain loops back to a
//! rename already in progress, the blocker is moved out of the way under a
//! temporary name and finishes once its own target frees up.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SchemaError};
use crate::object::ObjectId;

/// Progress of a single rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameState {
    /// Not looked at yet.
    Pending,
    /// On the resolution stack, waiting for its target to free up.
    InProgress,
    /// Moved to a temporary name to break a cycle.
    TemporarilyRenamed,
    /// Holds its final name.
    Complete,
}

/// A pending rename of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRecord {
    /// The renamed object.
    pub object: ObjectId,
    /// Name the database knows the object by.
    pub original_name: String,
    /// Name the object must end up with.
    pub name: String,
    current: String,
    state: RenameState,
}

impl RenameRecord {
    /// Creates a pending rename.
    #[must_use]
    pub fn new(object: ObjectId, original_name: impl Into<String>, name: impl Into<String>) -> Self {
        let original_name = original_name.into();
        Self {
            object,
            current: original_name.clone(),
            original_name,
            name: name.into(),
            state: RenameState::Pending,
        }
    }

    /// Returns the resolution state.
    #[must_use]
    pub fn state(&self) -> RenameState {
        self.state
    }

    /// Returns the name the database holds for the object right now.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }
}

/// One rename statement to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameStep {
    /// The renamed object.
    pub object: ObjectId,
    /// Name before the statement.
    pub from: String,
    /// Name after the statement.
    pub to: String,
    /// True when `to` is a temporary name.
    pub temporary: bool,
}

/// Resolves the order of the renames of one namespace.
#[derive(Debug)]
pub struct RenameResolver {
    records: BTreeMap<ObjectId, RenameRecord>,
    names: HashMap<String, ObjectId>,
    steps: Vec<RenameStep>,
}

impl RenameResolver {
    /// Creates a resolver.
    ///
    /// `occupied` lists the names held in the namespace by objects that are
    /// not renamed. Renamed objects occupy their original names.
    pub fn new<R, O>(records: R, occupied: O) -> Self
    where
        R: IntoIterator<Item = RenameRecord>,
        O: IntoIterator<Item = (String, ObjectId)>,
    {
        let mut names: HashMap<String, ObjectId> = occupied.into_iter().collect();
        let records: BTreeMap<ObjectId, RenameRecord> = records
            .into_iter()
            .map(|record| (record.object, record))
            .collect();
        for record in records.values() {
            names.insert(record.original_name.clone(), record.object);
        }
        Self {
            records,
            names,
            steps: Vec::new(),
        }
    }

    /// Computes the rename statements, in execution order.
    pub fn resolve(mut self) -> Result<Vec<RenameStep>> {
        let bound = 4 * self.records.len() + 1;
        let mut iterations = 0;
        let ids: Vec<ObjectId> = self.records.keys().copied().collect();

        for id in ids {
            if self.state(id) != RenameState::Pending {
                continue;
            }
            self.set_state(id, RenameState::InProgress);
            let mut stack = vec![id];

            while let Some(&top) = stack.last() {
                iterations += 1;
                let target = self.record(top)?.name.clone();
                if iterations > bound {
                    return Err(SchemaError::RenameCycleUnresolved {
                        name: target,
                        message: format!("no progress after {bound} steps"),
                    });
                }

                match self.names.get(&target).copied() {
                    None => {
                        self.apply(top, &target, false)?;
                        self.set_state(top, RenameState::Complete);
                        stack.pop();
                    }
                    Some(holder) if holder == top => {
                        self.set_state(top, RenameState::Complete);
                        stack.pop();
                    }
                    Some(holder) => match self.records.get(&holder).map(RenameRecord::state) {
                        Some(RenameState::Pending) => {
                            self.set_state(holder, RenameState::InProgress);
                            stack.push(holder);
                        }
                        Some(RenameState::InProgress | RenameState::TemporarilyRenamed) => {
                            let temporary = self.temporary_name(holder)?;
                            debug!(object = %holder, name = %temporary, "breaking rename cycle");
                            self.apply(holder, &temporary, true)?;
                            self.set_state(holder, RenameState::TemporarilyRenamed);
                        }
                        Some(RenameState::Complete) | None => {
                            return Err(SchemaError::RenameCycleUnresolved {
                                name: target,
                                message: format!("the name is held by object {holder}"),
                            });
                        }
                    },
                }
            }
        }

        Ok(self.steps)
    }

    fn record(&self, id: ObjectId) -> Result<&RenameRecord> {
        self.records.get(&id).ok_or(SchemaError::ObjectNotFound(id))
    }

    fn state(&self, id: ObjectId) -> RenameState {
        self.records
            .get(&id)
            .map_or(RenameState::Complete, RenameRecord::state)
    }

    fn set_state(&mut self, id: ObjectId, state: RenameState) {
        if let Some(record) = self.records.get_mut(&id) {
            record.state = state;
        }
    }

    fn apply(&mut self, id: ObjectId, to: &str, temporary: bool) -> Result<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(SchemaError::ObjectNotFound(id))?;
        let from = std::mem::replace(&mut record.current, to.to_string());
        if self.names.get(&from) == Some(&id) {
            self.names.remove(&from);
        }
        self.names.insert(to.to_string(), id);
        self.steps.push(RenameStep {
            object: id,
            from,
            to: to.to_string(),
            temporary,
        });
        Ok(())
    }

    fn temporary_name(&self, id: ObjectId) -> Result<String> {
        let current = &self.record(id)?.current;
        loop {
            let candidate = format!("__{current}__{}__", Uuid::new_v4().simple());
            if !self.names.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }
}
