//! Arena of schema objects.
//!
//! Every object lives in a single map keyed by [`ObjectId`]. Ownership is
//! expressed through the `owner` field plus the [`Collection`]s held by the
//! owning object's payload; reference edges live in a separate
//! [`ReferenceMap`]. Purged objects stay in the arena as tombstones so that
//! stale ids keep producing a meaningful error.

mod references;

use std::collections::{BTreeMap, BTreeSet};

pub use references::{Reference, ReferenceMap};

use crate::error::{Result, SchemaError};
use crate::object::{
    Collection, Lookup, ObjectData, ObjectId, ObjectState, ObjectType, SchemaData, SchemaObject,
    TableData,
};

/// A name scope inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Namespace {
    /// Schemas of the database.
    Database,
    /// Tables, views and constraints of a schema.
    Schema(ObjectId),
    /// Columns of a table.
    Columns(ObjectId),
    /// Constraints of a table.
    Constraints(ObjectId),
}

/// The object graph of one database.
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    objects: BTreeMap<ObjectId, SchemaObject>,
    schemas: Collection,
    references: ReferenceMap,
    next_id: u64,
}

impl Default for SchemaGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            schemas: Collection::default(),
            references: ReferenceMap::default(),
            next_id: 1,
        }
    }

    /// Returns the object with the given id, whatever its state.
    pub fn get(&self, id: ObjectId) -> Result<&SchemaObject> {
        self.objects.get(&id).ok_or(SchemaError::ObjectNotFound(id))
    }

    /// Returns the object if it is still part of the model.
    pub fn live(&self, id: ObjectId) -> Result<&SchemaObject> {
        let object = self.get(id)?;
        if object.is_live() {
            Ok(object)
        } else {
            Err(SchemaError::ObjectRemoved {
                object: object.describe(),
            })
        }
    }

    /// Returns the live object, checking its kind.
    pub fn live_of_type(&self, id: ObjectId, expected: ObjectType) -> Result<&SchemaObject> {
        let object = self.live(id)?;
        ensure_type(object, expected)?;
        Ok(object)
    }

    pub(crate) fn get_mut(&mut self, id: ObjectId) -> Result<&mut SchemaObject> {
        self.objects
            .get_mut(&id)
            .ok_or(SchemaError::ObjectNotFound(id))
    }

    /// Returns every object known to the arena, ordered by id.
    pub fn objects(&self) -> impl Iterator<Item = &SchemaObject> + '_ {
        self.objects.values()
    }

    /// Returns the schemas collection.
    #[must_use]
    pub fn schemas(&self) -> &Collection {
        &self.schemas
    }

    /// Returns the reference edges.
    #[must_use]
    pub fn references(&self) -> &ReferenceMap {
        &self.references
    }

    pub(crate) fn references_mut(&mut self) -> &mut ReferenceMap {
        &mut self.references
    }

    /// Describes an object for messages, falling back to its id.
    #[must_use]
    pub fn describe(&self, id: ObjectId) -> String {
        self.objects
            .get(&id)
            .map_or_else(|| id.to_string(), SchemaObject::describe)
    }

    /// Returns the payload of a schema.
    pub fn schema_data(&self, id: ObjectId) -> Result<&SchemaData> {
        let object = self.get(id)?;
        match &object.data {
            ObjectData::Schema(data) => Ok(data),
            _ => Err(unexpected(object, ObjectType::Schema)),
        }
    }

    /// Returns the payload of a table.
    pub fn table_data(&self, id: ObjectId) -> Result<&TableData> {
        let object = self.get(id)?;
        match &object.data {
            ObjectData::Table(data) => Ok(data),
            _ => Err(unexpected(object, ObjectType::Table)),
        }
    }

    /// Returns the schema an object belongs to.
    #[must_use]
    pub fn schema_of(&self, id: ObjectId) -> Option<ObjectId> {
        let mut current = self.objects.get(&id)?;
        loop {
            if current.object_type() == ObjectType::Schema {
                return Some(current.id);
            }
            current = self.objects.get(&current.owner?)?;
        }
    }

    /// Returns the table an object belongs to (the table itself for tables).
    #[must_use]
    pub fn table_of(&self, id: ObjectId) -> Option<ObjectId> {
        let object = self.objects.get(&id)?;
        match object.object_type() {
            ObjectType::Table => Some(id),
            ObjectType::Schema | ObjectType::View => None,
            _ => object.owner,
        }
    }

    /// Returns the live primary key of a table.
    #[must_use]
    pub fn primary_key_of(&self, table: ObjectId) -> Option<ObjectId> {
        let data = self.table_data(table).ok()?;
        data.constraints.members().iter().copied().find(|id| {
            self.objects
                .get(id)
                .is_some_and(|o| o.is_live() && o.object_type() == ObjectType::PrimaryKey)
        })
    }

    /// Looks a name up in a namespace.
    pub(crate) fn lookup(&self, namespace: Namespace, name: &str) -> Lookup {
        let Ok(collection) = self.collection(namespace) else {
            return Lookup::Missing;
        };
        if let Some(id) = collection.get(name) {
            return Lookup::Live(id);
        }
        collection
            .members()
            .iter()
            .rev()
            .copied()
            .find(|member| {
                self.objects.get(member).is_some_and(|o| {
                    o.state == ObjectState::PendingRemoval && o.name == name
                })
            })
            .map_or(Lookup::Missing, Lookup::Removed)
    }

    /// Adds an object to the arena and registers it with its owner.
    pub(crate) fn insert(
        &mut self,
        name: &str,
        owner: Option<ObjectId>,
        data: ObjectData,
    ) -> Result<ObjectId> {
        let kind = data.object_type();
        let is_virtual = matches!(&data, ObjectData::Index(index) if index.is_virtual);
        if name.is_empty() {
            return Err(SchemaError::InvalidDefinition {
                object: kind.to_string(),
                message: "name must not be empty".to_string(),
            });
        }
        if let Some(owner) = owner {
            self.live(owner)?;
        }

        let memberships = self.memberships(kind, owner)?;
        if !is_virtual {
            if let Some(scope) = memberships.first() {
                self.ensure_name_free(*scope, name, None)?;
            }
        }

        let id = ObjectId::new(self.next_id);
        self.next_id += 1;
        for namespace in &memberships {
            let collection = self.collection_mut(*namespace)?;
            collection.push(id);
            if !is_virtual {
                collection.register(name, id);
            }
        }
        self.objects.insert(
            id,
            SchemaObject {
                id,
                name: name.to_string(),
                state: ObjectState::Live,
                owner,
                data,
            },
        );
        Ok(id)
    }

    /// Changes an object's name, keeping every name index in sync.
    pub(crate) fn rename(&mut self, id: ObjectId, name: &str) -> Result<()> {
        let object = self.live(id)?;
        if name.is_empty() {
            return Err(SchemaError::InvalidDefinition {
                object: object.describe(),
                message: "name must not be empty".to_string(),
            });
        }
        if object.name == name {
            return Ok(());
        }
        let old = object.name.clone();
        let is_virtual = object.is_virtual_index();
        let memberships = self.memberships(object.object_type(), object.owner)?;

        if !is_virtual {
            if let Some(scope) = memberships.first() {
                self.ensure_name_free(*scope, name, Some(id))?;
            }
            for namespace in memberships {
                let collection = self.collection_mut(namespace)?;
                collection.unregister(&old, id);
                collection.register(name, id);
            }
        }
        self.get_mut(id)?.name = name.to_string();
        Ok(())
    }

    /// Computes the set removed together with `id`: the object, everything it
    /// owns and the virtual index of a primary key. Parents come first.
    pub(crate) fn cascade_set(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut order = vec![id];
        let mut seen = BTreeSet::from([id]);
        let mut next = 0;
        while next < order.len() {
            let current = order[next];
            next += 1;
            let children: Vec<ObjectId> = match &self.get(current)?.data {
                ObjectData::Schema(data) => data.objects.members().to_vec(),
                ObjectData::Table(data) => data
                    .columns
                    .members()
                    .iter()
                    .chain(data.constraints.members())
                    .copied()
                    .collect(),
                ObjectData::PrimaryKey(data) => vec![data.index],
                _ => Vec::new(),
            };
            for child in children {
                let live = self.objects.get(&child).is_some_and(SchemaObject::is_live);
                if live && seen.insert(child) {
                    order.push(child);
                }
            }
        }
        Ok(order)
    }

    /// Finds a live referencer of any member of `set` that is not itself in
    /// the set. Returns the referenced member and the edge.
    pub(crate) fn find_blocker(&self, set: &[ObjectId]) -> Option<(ObjectId, Reference)> {
        let members: BTreeSet<ObjectId> = set.iter().copied().collect();
        set.iter().find_map(|target| {
            self.references
                .referencing(*target)
                .find(|reference| {
                    !members.contains(&reference.object)
                        && self
                            .objects
                            .get(&reference.object)
                            .is_some_and(SchemaObject::is_live)
                })
                .map(|reference| (*target, *reference))
        })
    }

    /// Takes an object out of the model while keeping it readable.
    pub(crate) fn mark_removed(&mut self, id: ObjectId) -> Result<()> {
        let object = self.get(id)?;
        let name = object.name.clone();
        let is_virtual = object.is_virtual_index();
        let memberships = self.memberships(object.object_type(), object.owner)?;
        if !is_virtual {
            for namespace in memberships {
                self.collection_mut(namespace)?.unregister(&name, id);
            }
        }
        self.references.clear_outgoing(id);
        self.get_mut(id)?.state = ObjectState::PendingRemoval;
        Ok(())
    }

    /// Detaches an object from its owner's collections for good.
    pub(crate) fn purge(&mut self, id: ObjectId) -> Result<()> {
        let object = self.get(id)?;
        if object.state == ObjectState::Purged {
            return Ok(());
        }
        let name = object.name.clone();
        let memberships = self.memberships(object.object_type(), object.owner)?;
        for namespace in memberships {
            let collection = self.collection_mut(namespace)?;
            collection.unregister(&name, id);
            collection.detach(id);
        }
        self.references.clear_outgoing(id);
        self.get_mut(id)?.state = ObjectState::Purged;
        Ok(())
    }

    /// Purges every object pending removal. Returns how many were purged.
    pub(crate) fn purge_removed(&mut self) -> Result<usize> {
        let pending: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|o| o.state == ObjectState::PendingRemoval)
            .map(SchemaObject::id)
            .collect();
        for id in &pending {
            self.purge(*id)?;
        }
        Ok(pending.len())
    }

    /// Namespaces an object of `kind` owned by `owner` is a member of. The
    /// first entry is the scope its name must be unique in.
    fn memberships(&self, kind: ObjectType, owner: Option<ObjectId>) -> Result<Vec<Namespace>> {
        let owner_of = |expected: ObjectType| -> Result<ObjectId> {
            let owner = owner.ok_or_else(|| SchemaError::InvalidDefinition {
                object: kind.to_string(),
                message: format!("a {kind} must be owned by a {expected}"),
            })?;
            ensure_type(self.get(owner)?, expected)?;
            Ok(owner)
        };

        match kind {
            ObjectType::Schema => Ok(vec![Namespace::Database]),
            ObjectType::Table | ObjectType::View => {
                Ok(vec![Namespace::Schema(owner_of(ObjectType::Schema)?)])
            }
            ObjectType::Column => Ok(vec![Namespace::Columns(owner_of(ObjectType::Table)?)]),
            ObjectType::Index
            | ObjectType::PrimaryKey
            | ObjectType::ForeignKey
            | ObjectType::Check => {
                let table = owner_of(ObjectType::Table)?;
                let schema = self.schema_of(table).ok_or(SchemaError::ObjectNotFound(table))?;
                Ok(vec![Namespace::Schema(schema), Namespace::Constraints(table)])
            }
        }
    }

    fn ensure_name_free(
        &self,
        namespace: Namespace,
        name: &str,
        except: Option<ObjectId>,
    ) -> Result<()> {
        match self.collection(namespace)?.get(name) {
            Some(existing) if Some(existing) != except => Err(SchemaError::NameConflict {
                name: name.to_string(),
                existing: self.describe(existing),
            }),
            _ => Ok(()),
        }
    }

    fn collection(&self, namespace: Namespace) -> Result<&Collection> {
        match namespace {
            Namespace::Database => Ok(&self.schemas),
            Namespace::Schema(id) => Ok(&self.schema_data(id)?.objects),
            Namespace::Columns(id) => Ok(&self.table_data(id)?.columns),
            Namespace::Constraints(id) => Ok(&self.table_data(id)?.constraints),
        }
    }

    fn collection_mut(&mut self, namespace: Namespace) -> Result<&mut Collection> {
        let (id, expected) = match namespace {
            Namespace::Database => return Ok(&mut self.schemas),
            Namespace::Schema(id) => (id, ObjectType::Schema),
            Namespace::Columns(id) | Namespace::Constraints(id) => (id, ObjectType::Table),
        };
        ensure_type(self.get(id)?, expected)?;
        match (namespace, &mut self.get_mut(id)?.data) {
            (Namespace::Schema(_), ObjectData::Schema(data)) => Ok(&mut data.objects),
            (Namespace::Columns(_), ObjectData::Table(data)) => Ok(&mut data.columns),
            (Namespace::Constraints(_), ObjectData::Table(data)) => Ok(&mut data.constraints),
            _ => Err(SchemaError::ObjectNotFound(id)),
        }
    }
}

fn ensure_type(object: &SchemaObject, expected: ObjectType) -> Result<()> {
    if object.object_type() == expected {
        Ok(())
    } else {
        Err(unexpected(object, expected))
    }
}

fn unexpected(object: &SchemaObject, expected: ObjectType) -> SchemaError {
    SchemaError::UnexpectedObjectType {
        object: object.describe(),
        expected,
        actual: object.object_type(),
    }
}
