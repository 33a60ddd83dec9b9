//! Reference edges between schema objects.
//!
//! References are kept apart from ownership: an index referencing a column
//! does not own it, and only ownership implies cascading removal.

use std::collections::{BTreeSet, HashMap};

use crate::object::{ObjectId, ReferenceSource};

/// One end of a reference edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    /// The object on the other end of the edge.
    pub object: ObjectId,
    /// Why the dependency exists.
    pub source: ReferenceSource,
}

/// Bidirectional index of reference edges.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap {
    /// target -> objects that depend on it
    referencing: HashMap<ObjectId, BTreeSet<Reference>>,
    /// dependent -> objects it depends on
    referenced: HashMap<ObjectId, BTreeSet<Reference>>,
}

impl ReferenceMap {
    /// Returns the objects that depend on `target`.
    pub fn referencing(&self, target: ObjectId) -> impl Iterator<Item = &Reference> + '_ {
        self.referencing.get(&target).into_iter().flatten()
    }

    /// Returns the objects `dependent` depends on.
    pub fn referenced(&self, dependent: ObjectId) -> impl Iterator<Item = &Reference> + '_ {
        self.referenced.get(&dependent).into_iter().flatten()
    }

    /// Returns true if anything depends on `target`.
    #[must_use]
    pub fn is_referenced(&self, target: ObjectId) -> bool {
        self.referencing
            .get(&target)
            .is_some_and(|set| !set.is_empty())
    }

    pub(crate) fn add(&mut self, dependent: ObjectId, target: ObjectId, source: ReferenceSource) {
        self.referencing.entry(target).or_default().insert(Reference {
            object: dependent,
            source,
        });
        self.referenced.entry(dependent).or_default().insert(Reference {
            object: target,
            source,
        });
    }

    pub(crate) fn remove(&mut self, dependent: ObjectId, target: ObjectId, source: ReferenceSource) {
        if let Some(set) = self.referencing.get_mut(&target) {
            set.remove(&Reference {
                object: dependent,
                source,
            });
            if set.is_empty() {
                self.referencing.remove(&target);
            }
        }
        if let Some(set) = self.referenced.get_mut(&dependent) {
            set.remove(&Reference {
                object: target,
                source,
            });
            if set.is_empty() {
                self.referenced.remove(&dependent);
            }
        }
    }

    /// Drops every edge of `dependent` that was registered for `source`.
    pub(crate) fn remove_source(&mut self, dependent: ObjectId, source: ReferenceSource) {
        let targets: Vec<ObjectId> = self
            .referenced(dependent)
            .filter(|r| r.source == source)
            .map(|r| r.object)
            .collect();
        for target in targets {
            self.remove(dependent, target, source);
        }
    }

    /// Drops every edge where `dependent` is the depending side.
    pub(crate) fn clear_outgoing(&mut self, dependent: ObjectId) {
        let edges: Vec<Reference> = self.referenced(dependent).copied().collect();
        for edge in edges {
            self.remove(dependent, edge.object, edge.source);
        }
    }
}
