//! The builder facade.
//!
//! A [`DatabaseBuilder`] owns the object graph, the change tracker and a
//! dialect. In detached mode the builder describes a database as it already
//! exists; once attached, every mutation is recorded and
//! [`complete_pending_changes`](DatabaseBuilder::complete_pending_changes)
//! turns the recorded changes into DDL.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::definition::{Computation, DefaultValue, ForeignKeyAction, SqlExpr, SqlType};
use crate::dialect::DdlDialect;
use crate::emitter::{AlterationPolicy, DdlAction, DdlPipeline};
use crate::error::{Result, SchemaError};
use crate::graph::{Namespace, SchemaGraph};
use crate::object::{
    CheckData, ColumnData, ForeignKeyData, IndexColumn, IndexData, Lookup, ObjectData, ObjectId,
    ObjectType, PrimaryKeyData, ReferenceSource, SchemaData, SchemaObject, TableData, ViewData,
};
use crate::tracker::{ChangeDescriptor, ChangeTracker, ChangeValue, TrackerMode};

/// Construction options for a [`DatabaseBuilder`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuilderOptions {
    /// Initial tracker mode.
    #[serde(default)]
    pub mode: TrackerMode,
    /// Overrides the dialect's alteration policy.
    #[serde(default)]
    pub policy: Option<AlterationPolicy>,
}

/// Builds a schema and emits the DDL for the changes made to it.
#[derive(Debug)]
pub struct DatabaseBuilder {
    graph: SchemaGraph,
    tracker: ChangeTracker,
    dialect: Box<dyn DdlDialect>,
    policy: AlterationPolicy,
    actions: Vec<DdlAction>,
}

impl DatabaseBuilder {
    /// Creates a detached builder using the dialect's own policy.
    pub fn new(dialect: Box<dyn DdlDialect>) -> Result<Self> {
        Self::with_options(dialect, BuilderOptions::default())
    }

    /// Creates a builder with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Configuration`] if the alteration policy does
    /// not list every phase exactly once in a valid order.
    pub fn with_options(dialect: Box<dyn DdlDialect>, options: BuilderOptions) -> Result<Self> {
        let policy = options
            .policy
            .unwrap_or_else(|| dialect.alteration_policy());
        policy.validate()?;
        debug!(dialect = dialect.name(), mode = ?options.mode, "creating database builder");
        Ok(Self {
            graph: SchemaGraph::new(),
            tracker: ChangeTracker::new(options.mode),
            dialect,
            policy,
            actions: Vec::new(),
        })
    }

    // ================================================================
    // Accessors
    // ================================================================

    /// Returns the object graph.
    #[must_use]
    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    /// Returns the change tracker.
    #[must_use]
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn DdlDialect {
        self.dialect.as_ref()
    }

    /// Returns the alteration policy in use.
    #[must_use]
    pub fn policy(&self) -> &AlterationPolicy {
        &self.policy
    }

    /// Returns the tracker mode.
    #[must_use]
    pub fn mode(&self) -> TrackerMode {
        self.tracker.mode()
    }

    /// Returns an object by id, live or not.
    pub fn object(&self, id: ObjectId) -> Result<&SchemaObject> {
        self.graph.get(id)
    }

    /// Returns the live primary key of a table.
    #[must_use]
    pub fn primary_key(&self, table: ObjectId) -> Option<ObjectId> {
        self.graph.primary_key_of(table)
    }

    /// Looks up a schema by name.
    #[must_use]
    pub fn schema(&self, name: &str) -> Lookup {
        self.graph.lookup(Namespace::Database, name)
    }

    /// Looks up a table, view or constraint of a schema by name.
    #[must_use]
    pub fn find_object(&self, schema: ObjectId, name: &str) -> Lookup {
        self.graph.lookup(Namespace::Schema(schema), name)
    }

    /// Looks up a column of a table by name.
    #[must_use]
    pub fn find_column(&self, table: ObjectId, name: &str) -> Lookup {
        self.graph.lookup(Namespace::Columns(table), name)
    }

    /// Looks up an index or constraint of a table by name.
    #[must_use]
    pub fn find_constraint(&self, table: ObjectId, name: &str) -> Lookup {
        self.graph.lookup(Namespace::Constraints(table), name)
    }

    /// Returns every action emitted so far.
    #[must_use]
    pub fn actions(&self) -> &[DdlAction] {
        &self.actions
    }

    /// Hands the emitted actions over to the caller.
    pub fn take_actions(&mut self) -> Vec<DdlAction> {
        std::mem::take(&mut self.actions)
    }

    /// Returns the emitted SQL as one script.
    #[must_use]
    pub fn sql(&self) -> String {
        self.actions.iter().map(DdlAction::sql).collect()
    }

    // ================================================================
    // Session control
    // ================================================================

    /// Flushes pending changes and starts recording mutations.
    pub fn attach(&mut self) -> Result<usize> {
        let emitted = self.complete_pending_changes()?;
        self.tracker.set_mode(TrackerMode::Attached);
        Ok(emitted)
    }

    /// Flushes pending changes and stops recording mutations.
    pub fn detach(&mut self) -> Result<usize> {
        let emitted = self.complete_pending_changes()?;
        self.tracker.set_mode(TrackerMode::Detached);
        Ok(emitted)
    }

    /// Emits the DDL for every change recorded since the previous flush.
    ///
    /// Returns the number of actions emitted. On failure nothing is
    /// emitted and the pending changes stay recorded.
    pub fn complete_pending_changes(&mut self) -> Result<usize> {
        if !self.tracker.is_attached() {
            let purged = self.graph.purge_removed()?;
            self.tracker.complete();
            if purged > 0 {
                debug!(purged, "purged removed objects");
            }
            return Ok(0);
        }

        let actions = DdlPipeline::new(
            &self.graph,
            &self.tracker,
            self.dialect.as_ref(),
            &self.policy,
        )
        .run()?;

        let purged = self.graph.purge_removed()?;
        self.tracker.complete();
        let emitted = actions.len();
        info!(
            actions = emitted,
            purged,
            dialect = self.dialect.name(),
            "completed pending changes"
        );
        self.actions.extend(actions);
        Ok(emitted)
    }

    // ================================================================
    // Factories
    // ================================================================

    /// Creates a schema.
    pub fn create_schema(&mut self, name: &str) -> Result<ObjectId> {
        self.insert(name, None, ObjectData::Schema(SchemaData::default()))
    }

    /// Creates an empty table in a schema.
    pub fn create_table(&mut self, schema: ObjectId, name: &str) -> Result<ObjectId> {
        self.graph.live_of_type(schema, ObjectType::Schema)?;
        self.insert(name, Some(schema), ObjectData::Table(TableData::default()))
    }

    /// Creates a nullable column without default.
    pub fn create_column(
        &mut self,
        table: ObjectId,
        name: &str,
        sql_type: SqlType,
    ) -> Result<ObjectId> {
        self.graph.live_of_type(table, ObjectType::Table)?;
        self.insert(
            name,
            Some(table),
            ObjectData::Column(ColumnData {
                sql_type,
                nullable: true,
                default: None,
                computation: None,
            }),
        )
    }

    /// Creates an index over columns of `table`.
    pub fn create_index(
        &mut self,
        table: ObjectId,
        name: &str,
        columns: &[IndexColumn],
        unique: bool,
    ) -> Result<ObjectId> {
        self.graph.live_of_type(table, ObjectType::Table)?;
        let ids: Vec<ObjectId> = columns.iter().map(|c| c.column).collect();
        self.ensure_columns_of(table, ObjectType::Index, name, &ids)?;

        let index = self.insert(
            name,
            Some(table),
            ObjectData::Index(IndexData {
                columns: columns.to_vec(),
                unique,
                filter: None,
                is_virtual: false,
            }),
        )?;
        for column in ids {
            self.graph
                .references_mut()
                .add(index, column, ReferenceSource::IndexColumn);
        }
        Ok(index)
    }

    /// Sets the primary key of a table, replacing any existing one.
    ///
    /// The key is backed by a virtual unique index that carries the same
    /// name and is never emitted on its own.
    pub fn set_primary_key(
        &mut self,
        table: ObjectId,
        name: &str,
        columns: &[ObjectId],
    ) -> Result<ObjectId> {
        self.graph.live_of_type(table, ObjectType::Table)?;
        self.ensure_columns_of(table, ObjectType::PrimaryKey, name, columns)?;
        // Checked before the old key is removed.
        if name.is_empty() {
            return Err(invalid(ObjectType::PrimaryKey, name, "name must not be empty"));
        }

        let existing = self.graph.primary_key_of(table);
        let schema = self
            .graph
            .schema_of(table)
            .ok_or(SchemaError::ObjectNotFound(table))?;
        if let Lookup::Live(holder) = self.find_object(schema, name) {
            if Some(holder) != existing {
                return Err(SchemaError::NameConflict {
                    name: name.to_string(),
                    existing: self.graph.describe(holder),
                });
            }
        }
        if let Some(pk) = existing {
            self.remove(pk)?;
        }

        let index = self.insert(
            name,
            Some(table),
            ObjectData::Index(IndexData {
                columns: columns.iter().copied().map(IndexColumn::asc).collect(),
                unique: true,
                filter: None,
                is_virtual: true,
            }),
        )?;
        for column in columns {
            self.graph
                .references_mut()
                .add(index, *column, ReferenceSource::IndexColumn);
        }
        let pk = self.insert(name, Some(table), ObjectData::PrimaryKey(PrimaryKeyData { index }))?;
        self.graph
            .references_mut()
            .add(pk, index, ReferenceSource::PrimaryKeyIndex);
        Ok(pk)
    }

    /// Creates a foreign key from `columns` of `table` to a unique index or
    /// primary key.
    pub fn create_foreign_key(
        &mut self,
        table: ObjectId,
        name: &str,
        columns: &[ObjectId],
        referenced: ObjectId,
    ) -> Result<ObjectId> {
        self.graph.live_of_type(table, ObjectType::Table)?;
        self.ensure_columns_of(table, ObjectType::ForeignKey, name, columns)?;

        let target = self.graph.live(referenced)?;
        let index = match target.data() {
            ObjectData::PrimaryKey(data) => data.index,
            ObjectData::Index(data) if data.unique => referenced,
            ObjectData::Index(_) => {
                return Err(invalid(
                    ObjectType::ForeignKey,
                    name,
                    format!("{} is not unique", target.describe()),
                ))
            }
            _ => {
                return Err(SchemaError::UnexpectedObjectType {
                    object: target.describe(),
                    expected: ObjectType::Index,
                    actual: target.object_type(),
                })
            }
        };
        let key_len = self
            .graph
            .get(index)?
            .as_index()
            .map_or(0, |data| data.columns.len());
        if key_len != columns.len() {
            return Err(invalid(
                ObjectType::ForeignKey,
                name,
                format!(
                    "{} columns reference a key of {key_len} columns",
                    columns.len()
                ),
            ));
        }

        let fk = self.insert(
            name,
            Some(table),
            ObjectData::ForeignKey(ForeignKeyData {
                columns: columns.to_vec(),
                referenced_index: index,
                on_delete: ForeignKeyAction::default(),
                on_update: ForeignKeyAction::default(),
            }),
        )?;
        let references = self.graph.references_mut();
        for column in columns {
            references.add(fk, *column, ReferenceSource::ForeignKeyOrigin);
        }
        references.add(fk, index, ReferenceSource::ForeignKeyTarget);
        Ok(fk)
    }

    /// Creates a check constraint. The condition's declared columns must
    /// belong to `table`.
    pub fn create_check(
        &mut self,
        table: ObjectId,
        name: &str,
        condition: SqlExpr,
    ) -> Result<ObjectId> {
        self.graph.live_of_type(table, ObjectType::Table)?;
        let columns = self.resolve_columns(table, &condition)?;
        let check = self.insert(name, Some(table), ObjectData::Check(CheckData { condition }))?;
        for column in columns {
            self.graph
                .references_mut()
                .add(check, column, ReferenceSource::CheckCondition);
        }
        Ok(check)
    }

    /// Creates a view reading from `sources`.
    pub fn create_view(
        &mut self,
        schema: ObjectId,
        name: &str,
        definition: SqlExpr,
        sources: &[ObjectId],
    ) -> Result<ObjectId> {
        self.graph.live_of_type(schema, ObjectType::Schema)?;
        for source in sources {
            let object = self.graph.live(*source)?;
            if !matches!(object.object_type(), ObjectType::Table | ObjectType::View) {
                return Err(SchemaError::UnexpectedObjectType {
                    object: object.describe(),
                    expected: ObjectType::Table,
                    actual: object.object_type(),
                });
            }
        }
        let view = self.insert(name, Some(schema), ObjectData::View(ViewData { definition }))?;
        for source in sources {
            self.graph
                .references_mut()
                .add(view, *source, ReferenceSource::ViewSource);
        }
        Ok(view)
    }

    // ================================================================
    // Setters
    // ================================================================

    /// Renames an object.
    pub fn set_name(&mut self, id: ObjectId, name: &str) -> Result<()> {
        let object = self.graph.live(id)?;
        if object.is_virtual_index() {
            return Err(SchemaError::InvalidDefinition {
                object: object.describe(),
                message: "rename the primary key instead".to_string(),
            });
        }
        if object.name() == name {
            return Ok(());
        }
        let original = object.name().to_string();
        let backing_index = match object.data() {
            ObjectData::PrimaryKey(data) => Some(data.index),
            _ => None,
        };

        self.graph.rename(id, name)?;
        if let Some(index) = backing_index {
            self.graph.rename(index, name)?;
        }
        debug!(object = %id, from = %original, to = name, "renamed object");
        self.tracker
            .record_change(id, ChangeDescriptor::Name, ChangeValue::Name(original));
        Ok(())
    }

    /// Changes the nullability of a column.
    pub fn set_nullable(&mut self, column: ObjectId, nullable: bool) -> Result<()> {
        let data = self.column_mut(column)?;
        if data.nullable == nullable {
            return Ok(());
        }
        let original = std::mem::replace(&mut data.nullable, nullable);
        self.tracker.record_change(
            column,
            ChangeDescriptor::IsNullable,
            ChangeValue::Flag(original),
        );
        Ok(())
    }

    /// Changes the data type of a column.
    pub fn set_data_type(&mut self, column: ObjectId, sql_type: SqlType) -> Result<()> {
        let data = self.column_mut(column)?;
        if data.sql_type == sql_type {
            return Ok(());
        }
        let original = std::mem::replace(&mut data.sql_type, sql_type);
        self.tracker.record_change(
            column,
            ChangeDescriptor::DataType,
            ChangeValue::DataType(original),
        );
        Ok(())
    }

    /// Changes the default value of a column.
    pub fn set_default(&mut self, column: ObjectId, default: Option<DefaultValue>) -> Result<()> {
        let data = self.column_mut(column)?;
        if data.default == default {
            return Ok(());
        }
        let original = std::mem::replace(&mut data.default, default);
        self.tracker.record_change(
            column,
            ChangeDescriptor::DefaultValue,
            ChangeValue::Default(original),
        );
        Ok(())
    }

    /// Makes a column computed, or plain again with `None`.
    pub fn set_computation(
        &mut self,
        column: ObjectId,
        computation: Option<Computation>,
    ) -> Result<()> {
        let object = self.graph.live_of_type(column, ObjectType::Column)?;
        let table = object.owner().ok_or(SchemaError::ObjectNotFound(column))?;
        let sources = match &computation {
            Some(computation) => self.resolve_columns(table, &computation.expression)?,
            None => Vec::new(),
        };
        if sources.contains(&column) {
            return Err(SchemaError::InvalidDefinition {
                object: self.graph.describe(column),
                message: "a computed column cannot reference itself".to_string(),
            });
        }

        let data = self.column_mut(column)?;
        if data.computation == computation {
            return Ok(());
        }
        let original = std::mem::replace(&mut data.computation, computation);

        let references = self.graph.references_mut();
        references.remove_source(column, ReferenceSource::ColumnComputation);
        for source in sources {
            references.add(column, source, ReferenceSource::ColumnComputation);
        }
        self.tracker.record_change(
            column,
            ChangeDescriptor::Computation,
            ChangeValue::Computation(original),
        );
        Ok(())
    }

    /// Changes the uniqueness of an index.
    pub fn set_unique(&mut self, index: ObjectId, unique: bool) -> Result<()> {
        let current = self.index_of(index)?.unique;
        if current == unique {
            return Ok(());
        }
        if !unique {
            let blocker = self
                .graph
                .references()
                .referencing(index)
                .find(|r| {
                    r.source == ReferenceSource::ForeignKeyTarget
                        && self.graph.get(r.object).is_ok_and(SchemaObject::is_live)
                })
                .copied();
            if let Some(reference) = blocker {
                return Err(SchemaError::BlockingReference {
                    object: self.graph.describe(index),
                    referencer: self.graph.describe(reference.object),
                    reason: reference.source,
                });
            }
        }
        self.index_mut(index)?.unique = unique;
        self.tracker
            .record_change(index, ChangeDescriptor::IsUnique, ChangeValue::Flag(current));
        Ok(())
    }

    /// Sets or clears the filter of a partial index.
    pub fn set_filter(&mut self, index: ObjectId, filter: Option<SqlExpr>) -> Result<()> {
        self.index_of(index)?;
        let table = self
            .graph
            .table_of(index)
            .ok_or(SchemaError::ObjectNotFound(index))?;
        let sources = match &filter {
            Some(filter) => self.resolve_columns(table, filter)?,
            None => Vec::new(),
        };

        let data = self.index_mut(index)?;
        if data.filter == filter {
            return Ok(());
        }
        let original = std::mem::replace(&mut data.filter, filter);

        let references = self.graph.references_mut();
        references.remove_source(index, ReferenceSource::IndexFilter);
        for source in sources {
            references.add(index, source, ReferenceSource::IndexFilter);
        }
        self.tracker
            .record_change(index, ChangeDescriptor::Filter, ChangeValue::Filter(original));
        Ok(())
    }

    /// Changes the ON DELETE behavior of a foreign key.
    pub fn set_on_delete(&mut self, fk: ObjectId, action: ForeignKeyAction) -> Result<()> {
        let data = self.foreign_key_mut(fk)?;
        if data.on_delete == action {
            return Ok(());
        }
        let original = std::mem::replace(&mut data.on_delete, action);
        self.tracker.record_change(
            fk,
            ChangeDescriptor::OnDeleteBehavior,
            ChangeValue::Behavior(original),
        );
        Ok(())
    }

    /// Changes the ON UPDATE behavior of a foreign key.
    pub fn set_on_update(&mut self, fk: ObjectId, action: ForeignKeyAction) -> Result<()> {
        let data = self.foreign_key_mut(fk)?;
        if data.on_update == action {
            return Ok(());
        }
        let original = std::mem::replace(&mut data.on_update, action);
        self.tracker.record_change(
            fk,
            ChangeDescriptor::OnUpdateBehavior,
            ChangeValue::Behavior(original),
        );
        Ok(())
    }

    // ================================================================
    // Removal
    // ================================================================

    /// Removes an object together with everything it owns.
    ///
    /// Removing an already removed object does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::BlockingReference`] if a live object outside
    /// the removed set still depends on it.
    pub fn remove(&mut self, id: ObjectId) -> Result<()> {
        let object = self.graph.get(id)?;
        if !object.is_live() {
            return Ok(());
        }
        if object.is_virtual_index() {
            return Err(SchemaError::InvalidDefinition {
                object: object.describe(),
                message: "remove the primary key instead".to_string(),
            });
        }

        let set = self.graph.cascade_set(id)?;
        if let Some((target, reference)) = self.graph.find_blocker(&set) {
            return Err(SchemaError::BlockingReference {
                object: self.graph.describe(target),
                referencer: self.graph.describe(reference.object),
                reason: reference.source,
            });
        }

        debug!(object = %id, cascade = set.len(), "removing object");
        for member in &set {
            self.graph.mark_removed(*member)?;
        }
        for member in set {
            if self.tracker.is_new(member) {
                self.graph.purge(member)?;
            } else {
                self.tracker.record_change(
                    member,
                    ChangeDescriptor::IsRemoved,
                    ChangeValue::Flag(false),
                );
            }
        }
        Ok(())
    }

    // ================================================================
    // Helpers
    // ================================================================

    fn insert(&mut self, name: &str, owner: Option<ObjectId>, data: ObjectData) -> Result<ObjectId> {
        let kind = data.object_type();
        let id = self.graph.insert(name, owner, data)?;
        self.tracker.record_creation(id);
        debug!(object = %id, %kind, name, "created object");
        Ok(id)
    }

    fn ensure_columns_of(
        &self,
        table: ObjectId,
        kind: ObjectType,
        name: &str,
        columns: &[ObjectId],
    ) -> Result<()> {
        if columns.is_empty() {
            return Err(invalid(kind, name, "at least one column is required"));
        }
        for column in columns {
            let object = self.graph.live_of_type(*column, ObjectType::Column)?;
            if object.owner() != Some(table) {
                return Err(invalid(
                    kind,
                    name,
                    format!("{} belongs to another table", object.describe()),
                ));
            }
        }
        Ok(())
    }

    /// Maps the column names an expression declares to columns of `table`.
    fn resolve_columns(&self, table: ObjectId, expr: &SqlExpr) -> Result<Vec<ObjectId>> {
        expr.columns()
            .iter()
            .map(|name| {
                self.find_column(table, name)
                    .live()
                    .ok_or_else(|| SchemaError::NameNotFound {
                        kind: ObjectType::Column,
                        name: name.clone(),
                    })
            })
            .collect()
    }

    fn index_of(&self, index: ObjectId) -> Result<&IndexData> {
        let object = self.graph.live_of_type(index, ObjectType::Index)?;
        match object.as_index() {
            Some(data) if data.is_virtual => Err(SchemaError::InvalidDefinition {
                object: object.describe(),
                message: "the index of a primary key cannot be changed".to_string(),
            }),
            Some(data) => Ok(data),
            None => Err(SchemaError::ObjectNotFound(index)),
        }
    }

    fn column_mut(&mut self, column: ObjectId) -> Result<&mut ColumnData> {
        self.graph.live_of_type(column, ObjectType::Column)?;
        match &mut self.graph.get_mut(column)?.data {
            ObjectData::Column(data) => Ok(data),
            _ => Err(SchemaError::ObjectNotFound(column)),
        }
    }

    fn index_mut(&mut self, index: ObjectId) -> Result<&mut IndexData> {
        self.index_of(index)?;
        match &mut self.graph.get_mut(index)?.data {
            ObjectData::Index(data) => Ok(data),
            _ => Err(SchemaError::ObjectNotFound(index)),
        }
    }

    fn foreign_key_mut(&mut self, fk: ObjectId) -> Result<&mut ForeignKeyData> {
        self.graph.live_of_type(fk, ObjectType::ForeignKey)?;
        match &mut self.graph.get_mut(fk)?.data {
            ObjectData::ForeignKey(data) => Ok(data),
            _ => Err(SchemaError::ObjectNotFound(fk)),
        }
    }
}

fn invalid(kind: ObjectType, name: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::InvalidDefinition {
        object: format!("{kind} '{name}'"),
        message: message.into(),
    }
}
