//! Per-table classification of recorded changes.
//!
//! For every pre-existing table touched by a session, [`aggregate`] walks
//! the table's columns and constraints and sorts each one into a
//! [`TableDiff`]: created, removed, modified, renamed or recreated. The
//! dialect gets the final word on each object through its `handle_*` hooks,
//! which default to the `classify_*` methods below.

use std::collections::BTreeMap;

use crate::definition::ForeignKeyAction;
use crate::dialect::DdlDialect;
use crate::error::{Result, SchemaError};
use crate::graph::SchemaGraph;
use crate::object::{ColumnData, ObjectId, ObjectState, ObjectType, SchemaObject};
use crate::rename::RenameRecord;
use crate::tracker::{ChangeDescriptor, ChangeTracker, ChangeValue};

/// Read-only view of the state a diff is computed from.
#[derive(Debug, Clone, Copy)]
pub struct AggregationContext<'a> {
    /// The object graph.
    pub graph: &'a SchemaGraph,
    /// The change records of the session.
    pub tracker: &'a ChangeTracker,
}

impl<'a> AggregationContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(graph: &'a SchemaGraph, tracker: &'a ChangeTracker) -> Self {
        Self { graph, tracker }
    }

    /// Returns true if the object was created during the session.
    #[must_use]
    pub fn is_new(&self, object: ObjectId) -> bool {
        self.tracker.is_new(object)
    }

    /// Rebuilds a column's payload as it was when the session started.
    pub fn original_column(&self, column: ObjectId) -> Result<ColumnData> {
        let object = self.graph.get(column)?;
        let mut original = object
            .as_column()
            .cloned()
            .ok_or_else(|| SchemaError::UnexpectedObjectType {
                object: object.describe(),
                expected: ObjectType::Column,
                actual: object.object_type(),
            })?;

        for (descriptor, value) in self.tracker.changes(column) {
            match (descriptor, value) {
                (ChangeDescriptor::IsNullable, ChangeValue::Flag(nullable)) => {
                    original.nullable = *nullable;
                }
                (ChangeDescriptor::DataType, ChangeValue::DataType(sql_type)) => {
                    original.sql_type = sql_type.clone();
                }
                (ChangeDescriptor::DefaultValue, ChangeValue::Default(default)) => {
                    original.default = default.clone();
                }
                (ChangeDescriptor::Computation, ChangeValue::Computation(computation)) => {
                    original.computation = computation.clone();
                }
                _ => {}
            }
        }
        Ok(original)
    }

    fn rename_of(&self, object: &SchemaObject) -> Option<RenameRecord> {
        self.tracker
            .original_name(object.id())
            .filter(|original| *original != object.name())
            .map(|original| RenameRecord::new(object.id(), original, object.name()))
    }
}

/// A pre-existing column whose properties changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModification {
    /// The column.
    pub column: ObjectId,
    /// Payload at the start of the session.
    pub original: ColumnData,
    /// Current payload.
    pub current: ColumnData,
}

impl ColumnModification {
    /// Returns true if nullability changed.
    #[must_use]
    pub fn nullable_changed(&self) -> bool {
        self.original.nullable != self.current.nullable
    }

    /// Returns true if the data type changed.
    #[must_use]
    pub fn type_changed(&self) -> bool {
        self.original.sql_type != self.current.sql_type
    }

    /// Returns true if the default changed.
    #[must_use]
    pub fn default_changed(&self) -> bool {
        self.original.default != self.current.default
    }

    /// Returns true if a computed column becomes a plain one.
    #[must_use]
    pub fn drops_computation(&self) -> bool {
        self.original.computation.is_some() && self.current.computation.is_none()
    }
}

/// Structured difference of one altered table.
///
/// Recreated objects appear in both the removed and the created lists: they
/// are dropped under their original name and created with their current
/// definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// The altered table.
    pub table: ObjectId,
    /// Name of the table before the session, when it was renamed.
    pub original_name: Option<String>,
    /// Columns to add.
    pub created_columns: Vec<ObjectId>,
    /// Columns to drop.
    pub removed_columns: Vec<ObjectId>,
    /// Columns to alter in place.
    pub modified_columns: Vec<ColumnModification>,
    /// Indexes to create.
    pub created_indexes: Vec<ObjectId>,
    /// Indexes to drop.
    pub removed_indexes: Vec<ObjectId>,
    /// Foreign keys to add.
    pub created_foreign_keys: Vec<ObjectId>,
    /// Foreign keys to drop.
    pub removed_foreign_keys: Vec<ObjectId>,
    /// Checks to add.
    pub created_checks: Vec<ObjectId>,
    /// Checks to drop.
    pub removed_checks: Vec<ObjectId>,
    /// Primary key to add.
    pub created_primary_key: Option<ObjectId>,
    /// Primary key to drop.
    pub dropped_primary_key: Option<ObjectId>,
    /// Column renames by column id.
    pub column_renames: BTreeMap<ObjectId, RenameRecord>,
    /// Constraint and index renames by object id.
    pub constraint_renames: BTreeMap<ObjectId, RenameRecord>,
}

impl TableDiff {
    /// Creates an empty diff for `table`.
    #[must_use]
    pub fn new(table: ObjectId) -> Self {
        Self {
            table,
            original_name: None,
            created_columns: Vec::new(),
            removed_columns: Vec::new(),
            modified_columns: Vec::new(),
            created_indexes: Vec::new(),
            removed_indexes: Vec::new(),
            created_foreign_keys: Vec::new(),
            removed_foreign_keys: Vec::new(),
            created_checks: Vec::new(),
            removed_checks: Vec::new(),
            created_primary_key: None,
            dropped_primary_key: None,
            column_renames: BTreeMap::new(),
            constraint_renames: BTreeMap::new(),
        }
    }

    /// Returns true if the table needs no alteration.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.modified_columns.is_empty()
            && self.created_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.created_foreign_keys.is_empty()
            && self.removed_foreign_keys.is_empty()
            && self.created_checks.is_empty()
            && self.removed_checks.is_empty()
            && self.created_primary_key.is_none()
            && self.dropped_primary_key.is_none()
            && self.column_renames.is_empty()
            && self.constraint_renames.is_empty()
    }

    /// Returns true if the column is dropped and added again.
    #[must_use]
    pub fn is_recreated_column(&self, column: ObjectId) -> bool {
        self.removed_columns.contains(&column) && self.created_columns.contains(&column)
    }

    /// Default handling of an object created in the table.
    pub fn classify_creation(&mut self, ctx: &AggregationContext<'_>, object: ObjectId) -> Result<()> {
        match ctx.graph.get(object)?.object_type() {
            ObjectType::Column => push_once(&mut self.created_columns, object),
            ObjectType::Index => push_once(&mut self.created_indexes, object),
            ObjectType::ForeignKey => push_once(&mut self.created_foreign_keys, object),
            ObjectType::Check => push_once(&mut self.created_checks, object),
            ObjectType::PrimaryKey => self.created_primary_key = Some(object),
            ObjectType::Schema | ObjectType::Table | ObjectType::View => {}
        }
        Ok(())
    }

    /// Default handling of an object removed from the table.
    pub fn classify_removal(&mut self, ctx: &AggregationContext<'_>, object: ObjectId) -> Result<()> {
        match ctx.graph.get(object)?.object_type() {
            ObjectType::Column => push_once(&mut self.removed_columns, object),
            ObjectType::Index => push_once(&mut self.removed_indexes, object),
            ObjectType::ForeignKey => push_once(&mut self.removed_foreign_keys, object),
            ObjectType::Check => push_once(&mut self.removed_checks, object),
            ObjectType::PrimaryKey => self.dropped_primary_key = Some(object),
            ObjectType::Schema | ObjectType::Table | ObjectType::View => {}
        }
        Ok(())
    }

    /// Default handling of a pre-existing object with recorded changes.
    pub fn classify_modification(
        &mut self,
        ctx: &AggregationContext<'_>,
        object: ObjectId,
    ) -> Result<()> {
        let current = ctx.graph.live(object)?;
        let kind = current.object_type();
        let rename = ctx.rename_of(current);

        match kind {
            ObjectType::Column => {
                let data = current.as_column().cloned().ok_or(SchemaError::ObjectNotFound(object))?;
                let original = ctx.original_column(object)?;
                if data.computation.is_some() && original.computation != data.computation {
                    self.recreate_column(object);
                    return Ok(());
                }
                if original != data {
                    self.modified_columns.push(ColumnModification {
                        column: object,
                        original,
                        current: data,
                    });
                }
                if let Some(rename) = rename {
                    self.column_renames.insert(object, rename);
                }
            }
            ObjectType::Index => {
                let index = current.as_index().ok_or(SchemaError::ObjectNotFound(object))?;
                let unique_changed = ctx
                    .tracker
                    .original(object, ChangeDescriptor::IsUnique)
                    .and_then(ChangeValue::as_flag)
                    .is_some_and(|unique| unique != index.unique);
                let filter_changed = ctx
                    .tracker
                    .original(object, ChangeDescriptor::Filter)
                    .and_then(ChangeValue::as_filter)
                    .is_some_and(|filter| *filter != index.filter);
                if unique_changed || filter_changed {
                    self.recreate_constraint(kind, object);
                } else if let Some(rename) = rename {
                    self.constraint_renames.insert(object, rename);
                }
            }
            ObjectType::ForeignKey => {
                let fk = current
                    .as_foreign_key()
                    .ok_or(SchemaError::ObjectNotFound(object))?;
                let behavior_changed = |descriptor: ChangeDescriptor, value: ForeignKeyAction| {
                    ctx.tracker
                        .original(object, descriptor)
                        .and_then(ChangeValue::as_behavior)
                        .is_some_and(|original| original != value)
                };
                if behavior_changed(ChangeDescriptor::OnDeleteBehavior, fk.on_delete)
                    || behavior_changed(ChangeDescriptor::OnUpdateBehavior, fk.on_update)
                {
                    self.recreate_constraint(kind, object);
                } else if let Some(rename) = rename {
                    self.constraint_renames.insert(object, rename);
                }
            }
            ObjectType::PrimaryKey | ObjectType::Check => {
                if let Some(rename) = rename {
                    self.constraint_renames.insert(object, rename);
                }
            }
            ObjectType::Schema | ObjectType::Table | ObjectType::View => {}
        }
        Ok(())
    }

    /// Drops and re-adds a column, replacing any in-place change.
    pub fn recreate_column(&mut self, column: ObjectId) {
        push_once(&mut self.removed_columns, column);
        push_once(&mut self.created_columns, column);
        self.modified_columns.retain(|m| m.column != column);
        self.column_renames.remove(&column);
    }

    /// Drops and re-creates a constraint or index.
    pub fn recreate_constraint(&mut self, kind: ObjectType, object: ObjectId) {
        match kind {
            ObjectType::Index => {
                push_once(&mut self.removed_indexes, object);
                push_once(&mut self.created_indexes, object);
            }
            ObjectType::ForeignKey => {
                push_once(&mut self.removed_foreign_keys, object);
                push_once(&mut self.created_foreign_keys, object);
            }
            ObjectType::Check => {
                push_once(&mut self.removed_checks, object);
                push_once(&mut self.created_checks, object);
            }
            ObjectType::PrimaryKey => {
                self.dropped_primary_key = Some(object);
                self.created_primary_key = Some(object);
            }
            ObjectType::Schema | ObjectType::Table | ObjectType::Column | ObjectType::View => {
                return;
            }
        }
        self.constraint_renames.remove(&object);
    }

    /// Recreates the same-table constraints and computed columns that depend
    /// on a recreated column, transitively.
    pub(crate) fn cascade_recreations(&mut self, ctx: &AggregationContext<'_>) -> Result<()> {
        let mut worklist: Vec<ObjectId> = self
            .removed_columns
            .iter()
            .copied()
            .filter(|c| self.created_columns.contains(c))
            .collect();

        while let Some(column) = worklist.pop() {
            let dependents: Vec<ObjectId> = ctx
                .graph
                .references()
                .referencing(column)
                .map(|r| r.object)
                .collect();
            for dependent in dependents {
                let object = ctx.graph.get(dependent)?;
                if !object.is_live()
                    || ctx.is_new(dependent)
                    || ctx.graph.table_of(dependent) != Some(self.table)
                {
                    continue;
                }
                match object.object_type() {
                    ObjectType::Column => {
                        if !self.is_recreated_column(dependent) {
                            self.recreate_column(dependent);
                            worklist.push(dependent);
                        }
                    }
                    ObjectType::Index if object.is_virtual_index() => {
                        if let Some(pk) = ctx.graph.primary_key_of(self.table) {
                            self.recreate_constraint(ObjectType::PrimaryKey, pk);
                        }
                    }
                    kind => self.recreate_constraint(kind, dependent),
                }
            }
        }
        Ok(())
    }
}

fn push_once(list: &mut Vec<ObjectId>, id: ObjectId) {
    if !list.contains(&id) {
        list.push(id);
    }
}

/// Builds the diff of a pre-existing, live table.
pub fn aggregate(
    ctx: &AggregationContext<'_>,
    dialect: &dyn DdlDialect,
    table: ObjectId,
) -> Result<TableDiff> {
    let data = ctx.graph.table_data(table)?;
    let mut diff = TableDiff::new(table);
    diff.original_name = ctx
        .rename_of(ctx.graph.get(table)?)
        .map(|rename| rename.original_name);

    let members: Vec<ObjectId> = data
        .columns
        .members()
        .iter()
        .chain(data.constraints.members())
        .copied()
        .collect();

    for member in members {
        let object = ctx.graph.get(member)?;
        if object.is_virtual_index() {
            continue;
        }
        match (ctx.is_new(member), object.state()) {
            (true, ObjectState::Live) => dialect.handle_creation(ctx, &mut diff, member)?,
            (false, ObjectState::PendingRemoval) if ctx.tracker.was_removed(member) => {
                dialect.handle_removal(ctx, &mut diff, member)?;
            }
            (false, ObjectState::Live) if ctx.tracker.changes(member).next().is_some() => {
                dialect.handle_modification(ctx, &mut diff, member)?;
            }
            _ => {}
        }
    }

    diff.cascade_recreations(ctx)?;
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseBuilder;
    use crate::definition::{Computation, DefaultValue, SqlExpr, SqlType};
    use crate::dialect::PostgresDialect;
    use crate::object::IndexColumn;

    struct Fixture {
        db: DatabaseBuilder,
        table: ObjectId,
        id: ObjectId,
        price: ObjectId,
        qty: ObjectId,
    }

    fn fixture() -> Fixture {
        let mut db = DatabaseBuilder::new(Box::new(PostgresDialect::new())).unwrap();
        let schema = db.create_schema("shop").unwrap();
        let table = db.create_table(schema, "items").unwrap();
        let id = db.create_column(table, "id", SqlType::BigInt).unwrap();
        let price = db.create_column(table, "price", SqlType::Integer).unwrap();
        let qty = db.create_column(table, "qty", SqlType::Integer).unwrap();
        db.set_primary_key(table, "pk_items", &[id]).unwrap();
        db.attach().unwrap();
        Fixture {
            db,
            table,
            id,
            price,
            qty,
        }
    }

    fn diff_of(db: &DatabaseBuilder, table: ObjectId) -> TableDiff {
        let ctx = AggregationContext::new(db.graph(), db.tracker());
        aggregate(&ctx, db.dialect(), table).unwrap()
    }

    #[test]
    fn test_unchanged_table_has_empty_diff() {
        let f = fixture();
        assert!(diff_of(&f.db, f.table).is_empty());
    }

    #[test]
    fn test_round_trip_rename_is_no_change() {
        let mut f = fixture();
        f.db.set_name(f.price, "cost").unwrap();
        f.db.set_name(f.price, "price").unwrap();
        assert!(diff_of(&f.db, f.table).is_empty());
    }

    #[test]
    fn test_column_modification_keeps_first_original() {
        let mut f = fixture();
        f.db.set_nullable(f.qty, false).unwrap();
        f.db.set_default(f.qty, Some(DefaultValue::Integer(1))).unwrap();
        f.db.set_default(f.qty, Some(DefaultValue::Integer(2))).unwrap();
        f.db.set_name(f.qty, "quantity").unwrap();

        let diff = diff_of(&f.db, f.table);
        assert_eq!(diff.modified_columns.len(), 1);
        let modification = &diff.modified_columns[0];
        assert!(modification.nullable_changed());
        assert!(modification.default_changed());
        assert!(!modification.type_changed());
        assert_eq!(modification.original.default, None);
        assert_eq!(modification.current.default, Some(DefaultValue::Integer(2)));
        assert_eq!(diff.column_renames[&f.qty].original_name, "qty");
        assert_eq!(diff.column_renames[&f.qty].name, "quantity");
    }

    #[test]
    fn test_created_and_removed_members() {
        let mut f = fixture();
        let note = f.db.create_column(f.table, "note", SqlType::Text).unwrap();
        let index = f
            .db
            .create_index(f.table, "ix_items_note", &[IndexColumn::asc(note)], false)
            .unwrap();
        f.db.remove(f.qty).unwrap();

        let diff = diff_of(&f.db, f.table);
        assert_eq!(diff.created_columns, vec![note]);
        assert_eq!(diff.created_indexes, vec![index]);
        assert_eq!(diff.removed_columns, vec![f.qty]);
        assert!(diff.created_primary_key.is_none());
    }

    #[test]
    fn test_index_uniqueness_change_recreates_index() {
        let mut f = fixture();
        f.db.detach().unwrap();
        let index = f
            .db
            .create_index(f.table, "ix_items_price", &[IndexColumn::asc(f.price)], false)
            .unwrap();
        f.db.attach().unwrap();

        f.db.set_unique(index, true).unwrap();
        f.db.set_name(index, "ux_items_price").unwrap();

        let diff = diff_of(&f.db, f.table);
        assert_eq!(diff.removed_indexes, vec![index]);
        assert_eq!(diff.created_indexes, vec![index]);
        assert!(diff.constraint_renames.is_empty());
    }

    #[test]
    fn test_new_computation_recreates_dependents() {
        let mut f = fixture();
        f.db.detach().unwrap();
        let total = f.db.create_column(f.table, "total", SqlType::Integer).unwrap();
        let check = f
            .db
            .create_check(
                f.table,
                "ck_items_total",
                SqlExpr::new("total >= 0").with_columns(["total"]),
            )
            .unwrap();
        f.db.attach().unwrap();

        f.db
            .set_computation(
                total,
                Some(Computation::stored(
                    SqlExpr::new("price * qty").with_columns(["price", "qty"]),
                )),
            )
            .unwrap();

        let diff = diff_of(&f.db, f.table);
        assert!(diff.is_recreated_column(total));
        assert_eq!(diff.removed_checks, vec![check]);
        assert_eq!(diff.created_checks, vec![check]);
        assert!(diff.modified_columns.is_empty());
        assert!(!diff.is_recreated_column(f.id));
    }

    #[test]
    fn test_dropped_computation_is_in_place() {
        let mut f = fixture();
        f.db.detach().unwrap();
        let total = f.db.create_column(f.table, "total", SqlType::Integer).unwrap();
        f.db
            .set_computation(
                total,
                Some(Computation::stored(
                    SqlExpr::new("price * qty").with_columns(["price", "qty"]),
                )),
            )
            .unwrap();
        f.db.attach().unwrap();

        f.db.set_computation(total, None).unwrap();

        let diff = diff_of(&f.db, f.table);
        assert_eq!(diff.modified_columns.len(), 1);
        assert!(diff.modified_columns[0].drops_computation());
        assert!(diff.removed_columns.is_empty());
    }
}
