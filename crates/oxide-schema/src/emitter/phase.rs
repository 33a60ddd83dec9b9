//! Phases of a table alteration and the policy that orders them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// One step of altering an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlterPhase {
    /// Drop removed or recreated foreign keys and checks.
    DropForeignKeysAndChecks,
    /// Drop removed or recreated indexes.
    DropIndexes,
    /// Drop a removed or replaced primary key.
    DropPrimaryKey,
    /// Turn computed columns that lose their computation into plain ones.
    DropComputations,
    /// Drop removed and recreated columns.
    DropColumns,
    /// Rename constraints and indexes. Their names are unique per schema,
    /// so the pipeline renames them for every table of the schema before
    /// any table is created or altered.
    RenameConstraints,
    /// Rename columns.
    RenameColumns,
    /// Change default, nullability and type of existing columns.
    AlterColumns,
    /// Add new and recreated columns.
    AddColumns,
    /// Add a new primary key.
    AddPrimaryKey,
    /// Create new and recreated indexes.
    CreateIndexes,
    /// Add new and recreated foreign keys and checks.
    AddForeignKeysAndChecks,
}

impl AlterPhase {
    /// Every phase, in the default order.
    pub const ALL: [Self; 12] = [
        Self::DropForeignKeysAndChecks,
        Self::DropIndexes,
        Self::DropPrimaryKey,
        Self::DropComputations,
        Self::DropColumns,
        Self::RenameConstraints,
        Self::RenameColumns,
        Self::AlterColumns,
        Self::AddColumns,
        Self::AddPrimaryKey,
        Self::CreateIndexes,
        Self::AddForeignKeysAndChecks,
    ];
}

impl fmt::Display for AlterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DropForeignKeysAndChecks => "drop_foreign_keys_and_checks",
            Self::DropIndexes => "drop_indexes",
            Self::DropPrimaryKey => "drop_primary_key",
            Self::DropComputations => "drop_computations",
            Self::DropColumns => "drop_columns",
            Self::RenameConstraints => "rename_constraints",
            Self::RenameColumns => "rename_columns",
            Self::AlterColumns => "alter_columns",
            Self::AddColumns => "add_columns",
            Self::AddPrimaryKey => "add_primary_key",
            Self::CreateIndexes => "create_indexes",
            Self::AddForeignKeysAndChecks => "add_foreign_keys_and_checks",
        })
    }
}

/// How a dialect wants table alterations laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterationPolicy {
    /// Phases in execution order; each phase exactly once.
    pub phases: Vec<AlterPhase>,
    /// Whether consecutive clauses may share one `ALTER TABLE` statement.
    pub multi_clause_alter: bool,
}

impl Default for AlterationPolicy {
    fn default() -> Self {
        Self {
            phases: AlterPhase::ALL.to_vec(),
            multi_clause_alter: true,
        }
    }
}

/// Pairs of phases where the first must run before the second.
const REQUIRED_ORDER: &[(AlterPhase, AlterPhase)] = &[
    (AlterPhase::DropForeignKeysAndChecks, AlterPhase::DropPrimaryKey),
    (AlterPhase::DropForeignKeysAndChecks, AlterPhase::RenameConstraints),
    (AlterPhase::DropIndexes, AlterPhase::RenameConstraints),
    (AlterPhase::DropPrimaryKey, AlterPhase::RenameConstraints),
    (AlterPhase::DropColumns, AlterPhase::RenameColumns),
    (AlterPhase::RenameColumns, AlterPhase::AddColumns),
    (AlterPhase::AddColumns, AlterPhase::AddPrimaryKey),
    (AlterPhase::AddColumns, AlterPhase::CreateIndexes),
    (AlterPhase::AddColumns, AlterPhase::AddForeignKeysAndChecks),
    (AlterPhase::AddPrimaryKey, AlterPhase::AddForeignKeysAndChecks),
];

impl AlterationPolicy {
    /// Single-clause variant of the default order.
    #[must_use]
    pub fn single_clause() -> Self {
        Self {
            multi_clause_alter: false,
            ..Self::default()
        }
    }

    /// Checks that every phase appears once and that dependent phases are
    /// ordered after the phases they rely on.
    pub fn validate(&self) -> Result<()> {
        for phase in AlterPhase::ALL {
            let count = self.phases.iter().filter(|p| **p == phase).count();
            if count != 1 {
                return Err(SchemaError::Configuration(format!(
                    "phase {phase} must appear exactly once, found {count}"
                )));
            }
        }
        for (before, after) in REQUIRED_ORDER {
            if self.position(*before) > self.position(*after) {
                return Err(SchemaError::Configuration(format!(
                    "phase {before} must run before {after}"
                )));
            }
        }
        Ok(())
    }

    fn position(&self, phase: AlterPhase) -> usize {
        self.phases
            .iter()
            .position(|p| *p == phase)
            .unwrap_or(usize::MAX)
    }
}
