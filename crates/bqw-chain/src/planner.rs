//! Chain planning
//!
//! [`plan`] is a pure function of a [`ChainSpec`] and a [`ChainSnapshot`]:
//! it performs no I/O and always yields the same plan for the same inputs.

use crate::error::ChainError;
use crate::snapshot::ChainSnapshot;
use crate::spec::ChainSpec;
use bqw_core::{DatasetRef, TableName};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// One consecutive dataset pair of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop {
    /// 1-based position in the chain
    pub index: usize,
    pub source: DatasetRef,
    pub target: DatasetRef,
    /// Whether the target dataset existed when the snapshot was taken
    pub target_exists: bool,
}

/// Ensure view `target_dataset.table_name` selects from
/// `source_dataset.table_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOperation {
    pub hop: usize,
    pub source_dataset: DatasetRef,
    pub target_dataset: DatasetRef,
    pub table_name: TableName,
    /// Whether a relation with this name was already in the target
    pub target_exists: bool,
    /// Exclusion pattern that matched the table, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_by: Option<String>,
}

/// Non-fatal findings made while planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// An allow-listed table is not in the first dataset
    TableNotInBase { table: TableName, dataset: DatasetRef },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::TableNotInBase { table, dataset } => {
                write!(f, "Table {} is not in {}; skipping it", table, dataset)
            }
        }
    }
}

/// The ordered work of one chain invocation
#[derive(Debug, Clone, Serialize)]
pub struct ChainPlan {
    pub hops: Vec<Hop>,
    /// Ordered by hop, then by table name
    pub operations: Vec<ChainOperation>,
    pub warnings: Vec<PlanWarning>,
}

impl ChainPlan {
    /// Operations belonging to hop `index`, in plan order.
    pub fn operations_for(&self, index: usize) -> impl Iterator<Item = &ChainOperation> {
        self.operations.iter().filter(move |op| op.hop == index)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Tables chained at every hop.
    pub fn table_count(&self) -> usize {
        self.operations_for(1).count()
    }
}

/// Build the operation list for `spec` against `snapshot`.
///
/// Fails with `MissingDataset` when the first dataset is absent, or when a
/// later dataset is absent and `force` is off. Allow-listed tables that the
/// first dataset lacks only produce warnings.
pub fn plan(spec: &ChainSpec, snapshot: &ChainSnapshot) -> Result<ChainPlan, ChainError> {
    if let Some(missing) = snapshot.first_blocking_missing(spec) {
        return Err(ChainError::MissingDataset {
            dataset: missing.clone(),
        });
    }

    let base = spec.base();
    let base_tables = snapshot.inventory(base).cloned().unwrap_or_default();

    let mut warnings = Vec::new();
    let tables: BTreeSet<TableName> = match spec.allow_list() {
        Some(allowed) => {
            for table in allowed.difference(&base_tables) {
                warnings.push(PlanWarning::TableNotInBase {
                    table: table.clone(),
                    dataset: base.clone(),
                });
            }
            allowed.intersection(&base_tables).cloned().collect()
        }
        None => base_tables,
    };

    let mut hops = Vec::new();
    let mut operations = Vec::new();
    for (index, source, target) in spec.hops() {
        let target_inventory = snapshot.inventory(target);
        hops.push(Hop {
            index,
            source: source.clone(),
            target: target.clone(),
            target_exists: snapshot.exists(target),
        });
        for table in &tables {
            operations.push(ChainOperation {
                hop: index,
                source_dataset: source.clone(),
                target_dataset: target.clone(),
                table_name: table.clone(),
                target_exists: target_inventory.is_some_and(|inv| inv.contains(table)),
                excluded_by: spec.exclusion_for(table).map(str::to_string),
            });
        }
    }

    log::info!(
        "Planned {} operations over {} hops ({} tables)",
        operations.len(),
        hops.len(),
        tables.len()
    );

    Ok(ChainPlan {
        hops,
        operations,
        warnings,
    })
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod tests;
