//! DDL emission pipeline.
//!
//! A flush walks the objects touched since the previous flush and turns them
//! into [`DdlAction`]s in this order:
//!
//! 1. schema renames and creations;
//! 2. view drops;
//! 3. table and view renames, per schema;
//! 4. constraint and index names, per schema: drops of constraints whose
//!    name is taken over by another object, then renames;
//! 5. table creations, each followed by its indexes;
//! 6. alterations of pre-existing tables, phase by phase;
//! 7. foreign keys whose referenced index did not exist yet;
//! 8. view creations;
//! 9. removed tables (foreign keys between them first);
//! 10. schema drops.
//!
//! While emitting, the pipeline keeps track of the name the database knows
//! each object by and of which objects exist in the database at that point,
//! so every statement refers to objects exactly as they are when it runs.

mod phase;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use phase::{AlterPhase, AlterationPolicy};

use crate::aggregator::{aggregate, AggregationContext, TableDiff};
use crate::definition::{
    CheckDef, ColumnDef, ForeignKeyDef, IndexColumnDef, IndexDef, PrimaryKeyDef, QualifiedName,
    TableDef, ViewDef,
};
use crate::dialect::{AlterClause, DdlDialect};
use crate::error::{Result, SchemaError};
use crate::graph::SchemaGraph;
use crate::object::{IndexData, ObjectData, ObjectId, ObjectState, ObjectType, SchemaObject};
use crate::rename::{RenameRecord, RenameResolver, RenameStep};
use crate::tracker::ChangeTracker;

/// Separator appended after every statement.
pub const COMMAND_BOUNDARY: &str = ";\n";

/// What a DDL action does to its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// The object is created.
    Create,
    /// The object is renamed.
    Rename,
    /// The object is altered.
    Alter,
    /// The object is dropped.
    Remove,
}

/// One emitted unit of SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlAction {
    /// The object the action is about.
    pub object: ObjectId,
    /// What happens to the object.
    pub kind: ActionKind,
    sql: String,
}

impl DdlAction {
    /// Returns the SQL, every statement terminated by [`COMMAND_BOUNDARY`].
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the individual statements, without terminators.
    pub fn statements(&self) -> impl Iterator<Item = &str> + '_ {
        self.sql
            .split(COMMAND_BOUNDARY)
            .filter(|statement| !statement.is_empty())
    }
}

/// Clauses waiting to be emitted as one `ALTER TABLE` statement.
#[derive(Debug)]
struct AlterTableBatch {
    table: QualifiedName,
    clauses: Vec<AlterClause>,
}

impl AlterTableBatch {
    fn new(table: QualifiedName) -> Self {
        Self {
            table,
            clauses: Vec::new(),
        }
    }
}

/// Translates the tracked changes of one session into DDL actions.
///
/// The pipeline only reads the graph and the tracker; the caller commits
/// the outcome once [`run`](Self::run) succeeds.
pub(crate) struct DdlPipeline<'a> {
    graph: &'a SchemaGraph,
    tracker: &'a ChangeTracker,
    dialect: &'a dyn DdlDialect,
    policy: &'a AlterationPolicy,
    buffer: String,
    /// Database names that differ from the session's original names.
    names: HashMap<ObjectId, String>,
    /// Objects created (or re-created) by an emitted statement.
    emitted: HashSet<ObjectId>,
    /// Objects dropped by an emitted statement.
    dropped: HashSet<ObjectId>,
    deferred_foreign_keys: Vec<ObjectId>,
    /// Non-empty diffs of the pre-existing tables being altered.
    diffs: BTreeMap<ObjectId, TableDiff>,
    actions: Vec<DdlAction>,
}

impl<'a> DdlPipeline<'a> {
    pub(crate) fn new(
        graph: &'a SchemaGraph,
        tracker: &'a ChangeTracker,
        dialect: &'a dyn DdlDialect,
        policy: &'a AlterationPolicy,
    ) -> Self {
        Self {
            graph,
            tracker,
            dialect,
            policy,
            buffer: String::new(),
            names: HashMap::new(),
            emitted: HashSet::new(),
            dropped: HashSet::new(),
            deferred_foreign_keys: Vec::new(),
            diffs: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    /// Emits every pending change.
    pub(crate) fn run(mut self) -> Result<Vec<DdlAction>> {
        let touched = self.tracker.touched();
        if touched.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            objects = touched.len(),
            dialect = self.dialect.name(),
            "emitting DDL"
        );

        self.emit_schemas(&touched)?;
        self.emit_view_drops(&touched)?;
        self.emit_object_renames()?;
        self.collect_table_diffs(&touched)?;
        self.emit_constraint_names(&touched)?;
        self.emit_table_creations(&touched)?;
        self.emit_table_alterations()?;
        self.emit_deferred_foreign_keys()?;
        self.emit_view_creations(&touched)?;
        self.emit_table_removals(&touched)?;
        self.emit_schema_drops(&touched)?;
        Ok(self.actions)
    }

    // ================================================================
    // Flush steps
    // ================================================================

    fn emit_schemas(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        let schemas = self.touched_of(touched, ObjectType::Schema);

        let mut records = Vec::new();
        for id in &schemas {
            if let Some(record) = self.pending_rename(*id)? {
                records.push(record);
            }
        }
        let scope = self.graph.schemas().members().to_vec();
        for step in self.resolve_renames(records, &scope)? {
            self.dialect
                .append_rename_schema(&mut self.buffer, &step.from, &step.to);
            self.end_statement();
            self.finish_rename(&step);
        }

        for id in schemas {
            let schema = self.graph.get(id)?;
            if self.is_created(schema) {
                self.dialect.append_create_schema(&mut self.buffer, schema.name());
                self.end_statement();
                self.finish_action(id, ActionKind::Create);
                self.mark_emitted(id)?;
            }
        }
        Ok(())
    }

    fn emit_view_drops(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        for id in self.touched_of(touched, ObjectType::View) {
            if self.is_dropped(self.graph.get(id)?) {
                let name = self.db_qualified_name(id)?;
                self.dialect.append_drop_view(&mut self.buffer, &name);
                self.end_statement();
                self.finish_action(id, ActionKind::Remove);
                self.mark_dropped(id)?;
            }
        }
        Ok(())
    }

    fn emit_object_renames(&mut self) -> Result<()> {
        for schema in self.graph.schemas().members().to_vec() {
            if !self.graph.get(schema)?.is_live() {
                continue;
            }
            let scope: Vec<ObjectId> = self
                .graph
                .schema_data(schema)?
                .objects
                .members()
                .iter()
                .copied()
                .filter(|id| {
                    self.graph.get(*id).is_ok_and(|o| {
                        matches!(o.object_type(), ObjectType::Table | ObjectType::View)
                    })
                })
                .collect();

            let mut records = Vec::new();
            for id in &scope {
                if let Some(record) = self.pending_rename(*id)? {
                    records.push(record);
                }
            }
            let schema_name = self.db_name(schema)?;
            for step in self.resolve_renames(records, &scope)? {
                let from = QualifiedName::new(schema_name.clone(), step.from.clone());
                if self.graph.get(step.object)?.object_type() == ObjectType::View {
                    self.dialect
                        .append_rename_view(&mut self.buffer, &from, &step.to);
                } else {
                    self.dialect
                        .append_rename_table(&mut self.buffer, &from, &step.to);
                }
                self.end_statement();
                self.finish_rename(&step);
            }
        }
        Ok(())
    }

    fn emit_table_creations(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        for id in self.touched_of(touched, ObjectType::Table) {
            if !self.is_created(self.graph.get(id)?) {
                continue;
            }
            let Some(pk) = self.graph.primary_key_of(id) else {
                return Err(SchemaError::MissingPrimaryKey {
                    table: self.db_qualified_name(id)?.to_string(),
                });
            };
            let data = self.graph.table_data(id)?;
            let columns = self.live_members(data.columns.members(), None);
            let checks = self.live_members(data.constraints.members(), Some(ObjectType::Check));
            let foreign_keys =
                self.live_members(data.constraints.members(), Some(ObjectType::ForeignKey));
            let indexes: Vec<ObjectId> = self
                .live_members(data.constraints.members(), Some(ObjectType::Index))
                .into_iter()
                .filter(|ix| self.graph.get(*ix).is_ok_and(|o| !o.is_virtual_index()))
                .collect();

            self.mark_emitted(id)?;
            for member in columns.iter().chain(&checks).chain([&pk]) {
                self.mark_emitted(*member)?;
            }

            let mut inline = Vec::new();
            for fk in foreign_keys {
                if self.exists_in_db(self.referenced_index(fk)?) {
                    inline.push(fk);
                } else {
                    self.deferred_foreign_keys.push(fk);
                }
            }

            let table = TableDef {
                name: self.db_qualified_name(id)?,
                columns: columns
                    .iter()
                    .map(|c| self.column_def(*c))
                    .collect::<Result<_>>()?,
                primary_key: self.primary_key_def(pk)?,
                checks: checks
                    .iter()
                    .map(|c| self.check_def(*c))
                    .collect::<Result<_>>()?,
                foreign_keys: inline
                    .iter()
                    .map(|f| self.foreign_key_def(*f))
                    .collect::<Result<_>>()?,
            };
            debug!(table = %table.name, columns = table.columns.len(), "creating table");
            self.dialect.append_create_table(&mut self.buffer, &table);
            self.end_statement();
            self.finish_action(id, ActionKind::Create);
            for fk in inline {
                self.mark_emitted(fk)?;
            }

            for index in indexes {
                let def = self.index_def(index)?;
                self.dialect.append_create_index(&mut self.buffer, &def);
                self.end_statement();
                self.finish_action(index, ActionKind::Create);
                self.mark_emitted(index)?;
            }
        }
        Ok(())
    }

    fn collect_table_diffs(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        let tables: BTreeSet<ObjectId> = touched
            .iter()
            .filter_map(|id| self.graph.table_of(*id))
            .filter(|table| {
                !self.tracker.is_new(*table)
                    && self.graph.get(*table).is_ok_and(SchemaObject::is_live)
            })
            .collect();

        let ctx = AggregationContext::new(self.graph, self.tracker);
        for table in tables {
            let diff = aggregate(&ctx, self.dialect, table)?;
            if !diff.is_empty() {
                self.diffs.insert(table, diff);
            }
        }
        Ok(())
    }

    /// Constraint and index names are unique per schema, so their renames
    /// are resolved across every altered table of the schema at once, and
    /// before any table or index creation can claim a name.
    fn emit_constraint_names(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        for schema in self.graph.schemas().members().to_vec() {
            if !self.graph.get(schema)?.is_live() {
                continue;
            }
            let records: Vec<RenameRecord> = self
                .diffs
                .iter()
                .filter(|(table, _)| self.graph.schema_of(**table) == Some(schema))
                .flat_map(|(_, diff)| self.live_renames(&diff.constraint_renames))
                .collect();

            let claimed = self.claimed_constraint_names(touched, schema, &records)?;
            for id in self.dropped_constraints(touched, schema)? {
                let name = self.db_name(id)?;
                if claimed.get(&name).is_some_and(|holder| *holder != id) {
                    debug!(object = %id, name = %name, "dropping constraint ahead of name reuse");
                    self.emit_constraint_drop(id)?;
                }
            }

            let scope = self.constraints_in_schema(schema)?;
            for step in self.resolve_renames(records, &scope)? {
                let table = self.db_qualified_name(self.owning_table(step.object)?)?;
                let kind = self.graph.get(step.object)?.object_type();
                self.dialect.append_rename_constraint(
                    &mut self.buffer,
                    &table,
                    kind,
                    &step.from,
                    &step.to,
                );
                self.end_statement();
                self.finish_rename(&step);
            }
        }
        Ok(())
    }

    fn emit_table_alterations(&mut self) -> Result<()> {
        for (table, diff) in std::mem::take(&mut self.diffs) {
            if self.graph.primary_key_of(table).is_none() {
                return Err(SchemaError::MissingPrimaryKey {
                    table: self.db_qualified_name(table)?.to_string(),
                });
            }
            debug!(table = %table, "altering table");
            self.emit_alteration(&diff)?;
            self.finish_action(table, ActionKind::Alter);
        }
        Ok(())
    }

    fn emit_deferred_foreign_keys(&mut self) -> Result<()> {
        let deferred = std::mem::take(&mut self.deferred_foreign_keys);
        for fk in deferred {
            if self.emitted.contains(&fk) {
                continue;
            }
            let table = self.owning_table(fk)?;
            let mut batch = AlterTableBatch::new(self.db_qualified_name(table)?);
            let def = self.foreign_key_def(fk)?;
            self.push_clause(&mut batch, AlterClause::AddForeignKey(def));
            self.flush_batch(&mut batch);
            self.finish_action(fk, ActionKind::Alter);
            self.mark_emitted(fk)?;
        }
        Ok(())
    }

    fn emit_view_creations(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        for id in self.touched_of(touched, ObjectType::View) {
            if !self.is_created(self.graph.get(id)?) {
                continue;
            }
            let def = self.view_def(id)?;
            self.dialect.append_create_view(&mut self.buffer, &def);
            self.end_statement();
            self.finish_action(id, ActionKind::Create);
            self.mark_emitted(id)?;
        }
        Ok(())
    }

    fn emit_table_removals(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        let mut removed = Vec::new();
        for id in self.touched_of(touched, ObjectType::Table) {
            if self.is_dropped(self.graph.get(id)?) && !self.dropped.contains(&id) {
                removed.push(id);
            }
        }

        // Foreign keys between removed tables would block the drops.
        for table in &removed {
            let data = self.graph.table_data(*table)?;
            let foreign_keys: Vec<ObjectId> = data
                .constraints
                .members()
                .iter()
                .copied()
                .filter(|id| {
                    self.graph
                        .get(*id)
                        .is_ok_and(|o| o.object_type() == ObjectType::ForeignKey)
                })
                .collect();
            for fk in foreign_keys {
                if !self.exists_in_db(fk) {
                    continue;
                }
                let target = self.owning_table(self.referenced_index(fk)?)?;
                if target == *table || !removed.contains(&target) {
                    continue;
                }
                let mut batch = AlterTableBatch::new(self.db_qualified_name(*table)?);
                let name = self.db_name(fk)?;
                self.push_clause(
                    &mut batch,
                    AlterClause::DropConstraint {
                        kind: ObjectType::ForeignKey,
                        name,
                    },
                );
                self.flush_batch(&mut batch);
                self.finish_action(fk, ActionKind::Remove);
                self.mark_dropped(fk)?;
            }
        }

        for table in removed {
            let name = self.db_qualified_name(table)?;
            debug!(table = %name, "dropping table");
            self.dialect.append_drop_table(&mut self.buffer, &name);
            self.end_statement();
            self.finish_action(table, ActionKind::Remove);
            self.mark_dropped(table)?;
        }
        Ok(())
    }

    fn emit_schema_drops(&mut self, touched: &BTreeSet<ObjectId>) -> Result<()> {
        for id in self.touched_of(touched, ObjectType::Schema) {
            if self.is_dropped(self.graph.get(id)?) {
                let name = self.db_name(id)?;
                self.dialect.append_drop_schema(&mut self.buffer, &name);
                self.end_statement();
                self.finish_action(id, ActionKind::Remove);
                self.mark_dropped(id)?;
            }
        }
        Ok(())
    }

    // ================================================================
    // Table alteration
    // ================================================================

    fn emit_alteration(&mut self, diff: &TableDiff) -> Result<()> {
        let table = self.db_qualified_name(diff.table)?;
        let mut batch = AlterTableBatch::new(table.clone());
        let policy = self.policy;

        for phase in &policy.phases {
            match phase {
                AlterPhase::DropForeignKeysAndChecks => {
                    let constraints: Vec<(ObjectType, ObjectId)> = diff
                        .removed_foreign_keys
                        .iter()
                        .map(|id| (ObjectType::ForeignKey, *id))
                        .chain(diff.removed_checks.iter().map(|id| (ObjectType::Check, *id)))
                        .filter(|(_, id)| !self.dropped.contains(id))
                        .collect();
                    for (kind, id) in constraints {
                        let name = self.db_name(id)?;
                        self.push_clause(&mut batch, AlterClause::DropConstraint { kind, name });
                        self.mark_dropped(id)?;
                    }
                }
                AlterPhase::DropIndexes => {
                    for index in &diff.removed_indexes {
                        if self.dropped.contains(index) {
                            continue;
                        }
                        self.flush_batch(&mut batch);
                        let name = self.db_name(*index)?;
                        self.dialect
                            .append_drop_index(&mut self.buffer, &table, &name);
                        self.end_statement();
                        self.mark_dropped(*index)?;
                    }
                }
                AlterPhase::DropPrimaryKey => {
                    let pending = diff
                        .dropped_primary_key
                        .filter(|pk| !self.dropped.contains(pk));
                    if let Some(pk) = pending {
                        let name = self.db_name(pk)?;
                        self.push_clause(
                            &mut batch,
                            AlterClause::DropConstraint {
                                kind: ObjectType::PrimaryKey,
                                name,
                            },
                        );
                        self.mark_dropped(pk)?;
                    }
                }
                AlterPhase::DropComputations => {
                    for modification in &diff.modified_columns {
                        if modification.drops_computation() {
                            let column = self.db_name(modification.column)?;
                            self.push_clause(&mut batch, AlterClause::DropExpression { column });
                        }
                    }
                }
                AlterPhase::DropColumns => {
                    for column in &diff.removed_columns {
                        let name = self.db_name(*column)?;
                        self.push_clause(&mut batch, AlterClause::DropColumn { name });
                        self.mark_dropped(*column)?;
                    }
                }
                // Resolved schema-wide by `emit_constraint_names`.
                AlterPhase::RenameConstraints => {}
                AlterPhase::RenameColumns => {
                    let scope = self.graph.table_data(diff.table)?.columns.members().to_vec();
                    let records = self.live_renames(&diff.column_renames);
                    for step in self.resolve_renames(records, &scope)? {
                        self.flush_batch(&mut batch);
                        self.dialect.append_rename_column(
                            &mut self.buffer,
                            &table,
                            &step.from,
                            &step.to,
                        );
                        self.end_statement();
                        self.names.insert(step.object, step.to);
                    }
                }
                AlterPhase::AlterColumns => self.emit_column_changes(&mut batch, diff)?,
                AlterPhase::AddColumns => {
                    let (plain, computed): (Vec<ObjectId>, Vec<ObjectId>) =
                        diff.created_columns.iter().copied().partition(|c| {
                            self.graph
                                .get(*c)
                                .ok()
                                .and_then(SchemaObject::as_column)
                                .is_some_and(|data| data.computation.is_none())
                        });
                    for column in plain.into_iter().chain(computed) {
                        let mut def = self.column_def(column)?;
                        if !def.nullable && def.default.is_none() && def.computation.is_none() {
                            def.default = Some(self.dialect.default_for_type(&def.sql_type));
                        }
                        self.push_clause(&mut batch, AlterClause::AddColumn(def));
                        self.mark_emitted(column)?;
                    }
                }
                AlterPhase::AddPrimaryKey => {
                    if let Some(pk) = diff.created_primary_key {
                        let def = self.primary_key_def(pk)?;
                        self.push_clause(&mut batch, AlterClause::AddPrimaryKey(def));
                        self.mark_emitted(pk)?;
                    }
                }
                AlterPhase::CreateIndexes => {
                    for index in &diff.created_indexes {
                        self.flush_batch(&mut batch);
                        let def = self.index_def(*index)?;
                        self.dialect.append_create_index(&mut self.buffer, &def);
                        self.end_statement();
                        self.mark_emitted(*index)?;
                    }
                }
                AlterPhase::AddForeignKeysAndChecks => {
                    for fk in &diff.created_foreign_keys {
                        if !self.exists_in_db(self.referenced_index(*fk)?) {
                            self.deferred_foreign_keys.push(*fk);
                            continue;
                        }
                        let def = self.foreign_key_def(*fk)?;
                        self.push_clause(&mut batch, AlterClause::AddForeignKey(def));
                        self.mark_emitted(*fk)?;
                    }
                    for check in &diff.created_checks {
                        let def = self.check_def(*check)?;
                        self.push_clause(&mut batch, AlterClause::AddCheck(def));
                        self.mark_emitted(*check)?;
                    }
                }
            }
        }
        self.flush_batch(&mut batch);
        Ok(())
    }

    /// Drop stale defaults, then nullability, then types, then new defaults,
    /// each across every modified column.
    fn emit_column_changes(&mut self, batch: &mut AlterTableBatch, diff: &TableDiff) -> Result<()> {
        for m in &diff.modified_columns {
            if m.default_changed() && m.original.default.is_some() {
                let column = self.db_name(m.column)?;
                self.push_clause(batch, AlterClause::DropDefault { column });
            }
        }
        for m in diff.modified_columns.iter().filter(|m| m.nullable_changed()) {
            let column = self.db_name(m.column)?;
            let clause = if m.current.nullable {
                AlterClause::DropNotNull { column }
            } else {
                AlterClause::SetNotNull { column }
            };
            self.push_clause(batch, clause);
        }
        for m in diff.modified_columns.iter().filter(|m| m.type_changed()) {
            let column = self.db_name(m.column)?;
            let sql_type = m.current.sql_type.clone();
            self.push_clause(batch, AlterClause::SetDataType { column, sql_type });
        }
        for m in diff.modified_columns.iter().filter(|m| m.default_changed()) {
            if let Some(default) = m.current.default.clone() {
                let column = self.db_name(m.column)?;
                self.push_clause(batch, AlterClause::SetDefault { column, default });
            }
        }
        Ok(())
    }

    fn push_clause(&mut self, batch: &mut AlterTableBatch, clause: AlterClause) {
        if !self.dialect.supports_alter_clause(&clause) {
            self.flush_batch(batch);
            self.dialect
                .append_unsupported_alter_clause(&mut self.buffer, &batch.table, &clause);
            self.end_statement();
            return;
        }
        batch.clauses.push(clause);
        if !self.policy.multi_clause_alter {
            self.flush_batch(batch);
        }
    }

    fn flush_batch(&mut self, batch: &mut AlterTableBatch) {
        if batch.clauses.is_empty() {
            return;
        }
        let dialect = self.dialect;
        dialect.append_alter_table_header(&mut self.buffer, &batch.table);
        for (i, clause) in batch.clauses.drain(..).enumerate() {
            self.buffer.push_str(if i == 0 { " " } else { ",\n  " });
            dialect.append_alter_table_clause(&mut self.buffer, &clause);
        }
        self.end_statement();
    }

    // ================================================================
    // Bookkeeping
    // ================================================================

    fn end_statement(&mut self) {
        self.buffer.push_str(COMMAND_BOUNDARY);
    }

    fn finish_action(&mut self, object: ObjectId, kind: ActionKind) {
        if self.buffer.is_empty() {
            return;
        }
        let sql = std::mem::take(&mut self.buffer);
        debug!(object = %object, ?kind, "queued DDL action");
        self.actions.push(DdlAction { object, kind, sql });
    }

    fn finish_rename(&mut self, step: &RenameStep) {
        self.names.insert(step.object, step.to.clone());
        self.finish_action(step.object, ActionKind::Rename);
    }

    fn touched_of(&self, touched: &BTreeSet<ObjectId>, kind: ObjectType) -> Vec<ObjectId> {
        touched
            .iter()
            .copied()
            .filter(|id| self.graph.get(*id).is_ok_and(|o| o.object_type() == kind))
            .collect()
    }

    fn live_members(&self, members: &[ObjectId], kind: Option<ObjectType>) -> Vec<ObjectId> {
        members
            .iter()
            .copied()
            .filter(|id| {
                self.graph.get(*id).is_ok_and(|o| {
                    o.is_live() && kind.map_or(true, |kind| o.object_type() == kind)
                })
            })
            .collect()
    }

    /// Created during the session and still live.
    fn is_created(&self, object: &SchemaObject) -> bool {
        object.is_live() && self.tracker.is_new(object.id())
    }

    /// Existed before the session and was removed during it.
    fn is_dropped(&self, object: &SchemaObject) -> bool {
        object.state() == ObjectState::PendingRemoval
            && !self.tracker.is_new(object.id())
            && self.tracker.was_removed(object.id())
    }

    /// Whether the object exists in the database at this point of the script.
    fn exists_in_db(&self, id: ObjectId) -> bool {
        if self.emitted.contains(&id) {
            return true;
        }
        if self.dropped.contains(&id) || self.tracker.is_new(id) {
            return false;
        }
        self.graph
            .get(id)
            .is_ok_and(|o| o.state() != ObjectState::Purged)
    }

    /// The object plus what is created or dropped implicitly with it.
    fn with_implicit(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut ids = vec![id];
        match self.graph.get(id)?.data() {
            ObjectData::Table(data) => {
                ids.extend(data.columns.members());
                ids.extend(data.constraints.members());
            }
            ObjectData::PrimaryKey(data) => ids.push(data.index),
            _ => {}
        }
        Ok(ids)
    }

    fn mark_emitted(&mut self, id: ObjectId) -> Result<()> {
        let object = self.graph.get(id)?;
        let name = object.name().to_string();
        let implicit = match object.data() {
            ObjectData::PrimaryKey(data) => vec![data.index],
            _ => Vec::new(),
        };
        self.names.insert(id, name);
        for id in std::iter::once(id).chain(implicit) {
            self.dropped.remove(&id);
            self.emitted.insert(id);
        }
        Ok(())
    }

    fn mark_dropped(&mut self, id: ObjectId) -> Result<()> {
        for id in self.with_implicit(id)? {
            self.emitted.remove(&id);
            self.dropped.insert(id);
        }
        Ok(())
    }

    // ================================================================
    // Names
    // ================================================================

    /// The name the database knows the object by at this point.
    fn db_name(&self, id: ObjectId) -> Result<String> {
        if let Some(name) = self.names.get(&id) {
            return Ok(name.clone());
        }
        let object = self.graph.get(id)?;
        Ok(self
            .tracker
            .original_name(id)
            .unwrap_or(object.name())
            .to_string())
    }

    fn db_qualified_name(&self, id: ObjectId) -> Result<QualifiedName> {
        let schema = self
            .graph
            .schema_of(id)
            .ok_or(SchemaError::ObjectNotFound(id))?;
        Ok(QualifiedName::new(self.db_name(schema)?, self.db_name(id)?))
    }

    fn pending_rename(&self, id: ObjectId) -> Result<Option<RenameRecord>> {
        let object = self.graph.get(id)?;
        if !object.is_live() || self.tracker.is_new(id) {
            return Ok(None);
        }
        let current = self.db_name(id)?;
        Ok((current != object.name()).then(|| RenameRecord::new(id, current, object.name())))
    }

    fn live_renames(
        &self,
        renames: &BTreeMap<ObjectId, RenameRecord>,
    ) -> Vec<RenameRecord> {
        renames
            .values()
            .filter(|r| self.exists_in_db(r.object))
            .cloned()
            .collect()
    }

    /// Orders `records` against the names the rest of `scope` holds in the
    /// database right now.
    fn resolve_renames(
        &self,
        records: Vec<RenameRecord>,
        scope: &[ObjectId],
    ) -> Result<Vec<RenameStep>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let renamed: HashSet<ObjectId> = records.iter().map(|r| r.object).collect();
        let mut occupied = Vec::new();
        for id in scope {
            let skip = renamed.contains(id)
                || !self.exists_in_db(*id)
                || self.graph.get(*id).is_ok_and(SchemaObject::is_virtual_index);
            if !skip {
                occupied.push((self.db_name(*id)?, *id));
            }
        }
        RenameResolver::new(records, occupied).resolve()
    }

    fn constraints_in_schema(&self, schema: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(self
            .graph
            .schema_data(schema)?
            .objects
            .members()
            .iter()
            .copied()
            .filter(|id| {
                self.graph
                    .get(*id)
                    .is_ok_and(|o| o.object_type().is_constraint())
            })
            .collect())
    }

    /// Names constraints of `schema` will hold once this flush is applied,
    /// with the object that takes each one.
    fn claimed_constraint_names(
        &self,
        touched: &BTreeSet<ObjectId>,
        schema: ObjectId,
        renames: &[RenameRecord],
    ) -> Result<HashMap<String, ObjectId>> {
        let mut claimed = HashMap::new();
        for table in self.touched_of(touched, ObjectType::Table) {
            if self.graph.schema_of(table) != Some(schema) || !self.is_created(self.graph.get(table)?)
            {
                continue;
            }
            let data = self.graph.table_data(table)?;
            for id in self.live_members(data.constraints.members(), None) {
                let object = self.graph.get(id)?;
                if !object.is_virtual_index() {
                    claimed.insert(object.name().to_string(), id);
                }
            }
        }
        for (table, diff) in &self.diffs {
            if self.graph.schema_of(*table) != Some(schema) {
                continue;
            }
            let created = diff
                .created_indexes
                .iter()
                .chain(&diff.created_foreign_keys)
                .chain(&diff.created_checks)
                .chain(&diff.created_primary_key);
            for id in created {
                claimed.insert(self.graph.get(*id)?.name().to_string(), *id);
            }
        }
        for record in renames {
            claimed.insert(record.name.clone(), record.object);
        }
        Ok(claimed)
    }

    /// Constraints of `schema` that this flush drops and that still exist.
    fn dropped_constraints(
        &self,
        touched: &BTreeSet<ObjectId>,
        schema: ObjectId,
    ) -> Result<Vec<ObjectId>> {
        let mut dropped = Vec::new();
        for (table, diff) in &self.diffs {
            if self.graph.schema_of(*table) == Some(schema) {
                dropped.extend(
                    diff.removed_foreign_keys
                        .iter()
                        .chain(&diff.removed_checks)
                        .chain(&diff.removed_indexes)
                        .chain(&diff.dropped_primary_key),
                );
            }
        }
        for table in self.touched_of(touched, ObjectType::Table) {
            if self.graph.schema_of(table) != Some(schema) || !self.is_dropped(self.graph.get(table)?)
            {
                continue;
            }
            let data = self.graph.table_data(table)?;
            dropped.extend(data.constraints.members().iter().copied().filter(|id| {
                self.graph
                    .get(*id)
                    .is_ok_and(|o| o.state() == ObjectState::PendingRemoval && !o.is_virtual_index())
            }));
        }
        dropped.retain(|id| self.exists_in_db(*id));
        Ok(dropped)
    }

    /// Drops one constraint on its own, after the removed foreign keys that
    /// still point at it.
    fn emit_constraint_drop(&mut self, id: ObjectId) -> Result<()> {
        if !self.exists_in_db(id) {
            return Ok(());
        }
        let key_index = match self.graph.get(id)?.data() {
            ObjectData::PrimaryKey(data) => Some(data.index),
            ObjectData::Index(_) => Some(id),
            _ => None,
        };
        if let Some(index) = key_index {
            let referencing: Vec<ObjectId> = self
                .graph
                .objects()
                .filter(|o| {
                    o.state() == ObjectState::PendingRemoval
                        && o.as_foreign_key()
                            .is_some_and(|fk| fk.referenced_index == index)
                })
                .map(SchemaObject::id)
                .collect();
            for fk in referencing {
                self.emit_constraint_drop(fk)?;
            }
        }

        let kind = self.graph.get(id)?.object_type();
        let table = self.db_qualified_name(self.owning_table(id)?)?;
        let name = self.db_name(id)?;
        if kind == ObjectType::Index {
            self.dialect.append_drop_index(&mut self.buffer, &table, &name);
            self.end_statement();
        } else {
            let mut batch = AlterTableBatch::new(table);
            self.push_clause(&mut batch, AlterClause::DropConstraint { kind, name });
            self.flush_batch(&mut batch);
        }
        self.finish_action(id, ActionKind::Remove);
        self.mark_dropped(id)
    }

    // ================================================================
    // Definitions
    // ================================================================

    fn owning_table(&self, id: ObjectId) -> Result<ObjectId> {
        self.graph
            .table_of(id)
            .ok_or(SchemaError::ObjectNotFound(id))
    }

    fn index_data(&self, id: ObjectId) -> Result<&'a IndexData> {
        let object = self.graph.get(id)?;
        object.as_index().ok_or_else(|| kind_error(object, ObjectType::Index))
    }

    fn referenced_index(&self, fk: ObjectId) -> Result<ObjectId> {
        let object = self.graph.get(fk)?;
        object
            .as_foreign_key()
            .map(|data| data.referenced_index)
            .ok_or_else(|| kind_error(object, ObjectType::ForeignKey))
    }

    fn index_column_names(&self, index: &IndexData) -> Result<Vec<String>> {
        index.columns.iter().map(|c| self.db_name(c.column)).collect()
    }

    fn column_def(&self, id: ObjectId) -> Result<ColumnDef> {
        let object = self.graph.get(id)?;
        let data = object
            .as_column()
            .ok_or_else(|| kind_error(object, ObjectType::Column))?;
        Ok(ColumnDef {
            name: object.name().to_string(),
            sql_type: data.sql_type.clone(),
            nullable: data.nullable,
            default: data.default.clone(),
            computation: data.computation.clone(),
        })
    }

    fn index_def(&self, id: ObjectId) -> Result<IndexDef> {
        let object = self.graph.get(id)?;
        let data = self.index_data(id)?;
        let columns = data
            .columns
            .iter()
            .map(|c| {
                Ok(IndexColumnDef {
                    name: self.db_name(c.column)?,
                    order: c.order,
                })
            })
            .collect::<Result<_>>()?;
        Ok(IndexDef {
            name: object.name().to_string(),
            table: self.db_qualified_name(self.owning_table(id)?)?,
            columns,
            unique: data.unique,
            filter: data.filter.clone(),
        })
    }

    fn primary_key_def(&self, id: ObjectId) -> Result<PrimaryKeyDef> {
        let object = self.graph.get(id)?;
        let ObjectData::PrimaryKey(data) = object.data() else {
            return Err(kind_error(object, ObjectType::PrimaryKey));
        };
        Ok(PrimaryKeyDef {
            name: object.name().to_string(),
            columns: self.index_column_names(self.index_data(data.index)?)?,
        })
    }

    fn foreign_key_def(&self, id: ObjectId) -> Result<ForeignKeyDef> {
        let object = self.graph.get(id)?;
        let data = object
            .as_foreign_key()
            .ok_or_else(|| kind_error(object, ObjectType::ForeignKey))?;
        let referenced = self.index_data(data.referenced_index)?;
        Ok(ForeignKeyDef {
            name: object.name().to_string(),
            columns: data
                .columns
                .iter()
                .map(|c| self.db_name(*c))
                .collect::<Result<_>>()?,
            referenced_table: self
                .db_qualified_name(self.owning_table(data.referenced_index)?)?,
            referenced_columns: self.index_column_names(referenced)?,
            on_delete: data.on_delete,
            on_update: data.on_update,
        })
    }

    fn check_def(&self, id: ObjectId) -> Result<CheckDef> {
        let object = self.graph.get(id)?;
        let ObjectData::Check(data) = object.data() else {
            return Err(kind_error(object, ObjectType::Check));
        };
        Ok(CheckDef {
            name: object.name().to_string(),
            condition: data.condition.clone(),
        })
    }

    fn view_def(&self, id: ObjectId) -> Result<ViewDef> {
        let object = self.graph.get(id)?;
        let ObjectData::View(data) = object.data() else {
            return Err(kind_error(object, ObjectType::View));
        };
        Ok(ViewDef {
            name: self.db_qualified_name(id)?,
            definition: data.definition.clone(),
        })
    }
}

fn kind_error(object: &SchemaObject, expected: ObjectType) -> SchemaError {
    SchemaError::UnexpectedObjectType {
        object: object.describe(),
        expected,
        actual: object.object_type(),
    }
}
