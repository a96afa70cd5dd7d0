//! Point-in-time view of the warehouse taken before planning

use crate::error::ChainError;
use crate::retry::{with_retry, RetryPolicy};
use crate::spec::ChainSpec;
use bqw_core::{DatasetRef, TableName};
use bqw_db::Warehouse;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

/// Dataset existence and table inventories, read once per invocation.
///
/// Nothing here is re-verified later; `Created` vs `Updated` decisions are
/// only as fresh as the moment the snapshot was captured.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    existence: BTreeMap<DatasetRef, bool>,
    inventories: BTreeMap<DatasetRef, BTreeSet<TableName>>,
}

impl ChainSnapshot {
    /// Query existence of every chain dataset and the inventory of each
    /// one that exists.
    ///
    /// Rejects chains that reach the same remote dataset twice before any
    /// call is made. Stops after the existence checks when planning is bound
    /// to fail anyway, so a chain rejected for a missing dataset lists nothing.
    pub async fn capture(
        spec: &ChainSpec,
        warehouse: &dyn Warehouse,
        policy: &RetryPolicy,
    ) -> Result<Self, ChainError> {
        spec.ensure_distinct(|d| warehouse.canonical(d))?;

        let mut snapshot = Self::default();
        let cancel = CancellationToken::new();

        for dataset in spec.datasets() {
            let label = format!("Checking dataset {}", dataset);
            let exists =
                with_retry(policy, &label, &cancel, move || warehouse.dataset_exists(dataset))
                    .await
                    .map_err(|failure| ChainError::Warehouse {
                        context: label.clone(),
                        source: failure.error,
                    })?;
            log::debug!("Dataset {} exists: {}", dataset, exists);
            snapshot.existence.insert(dataset.clone(), exists);
        }

        if snapshot.first_blocking_missing(spec).is_some() {
            return Ok(snapshot);
        }

        for dataset in spec.datasets() {
            if !snapshot.exists(dataset) {
                continue;
            }
            let label = format!("Listing tables in {}", dataset);
            let tables = with_retry(policy, &label, &cancel, move || warehouse.list_tables(dataset))
                .await
                .map_err(|failure| ChainError::Warehouse {
                    context: label.clone(),
                    source: failure.error,
                })?;
            log::debug!("Dataset {} has {} tables", dataset, tables.len());
            snapshot
                .inventories
                .insert(dataset.clone(), tables.into_iter().map(|t| t.name).collect());
        }

        Ok(snapshot)
    }

    /// Record a dataset by hand; `None` tables means it does not exist.
    pub fn insert(&mut self, dataset: DatasetRef, tables: Option<BTreeSet<TableName>>) {
        self.existence.insert(dataset.clone(), tables.is_some());
        match tables {
            Some(tables) => {
                self.inventories.insert(dataset, tables);
            }
            None => {
                self.inventories.remove(&dataset);
            }
        }
    }

    pub fn exists(&self, dataset: &DatasetRef) -> bool {
        self.existence.get(dataset).copied().unwrap_or(false)
    }

    pub fn inventory(&self, dataset: &DatasetRef) -> Option<&BTreeSet<TableName>> {
        self.inventories.get(dataset)
    }

    /// The missing dataset that makes the chain impossible to plan.
    ///
    /// The first dataset must always exist; later ones only without `force`.
    pub(crate) fn first_blocking_missing<'a>(
        &self,
        spec: &'a ChainSpec,
    ) -> Option<&'a DatasetRef> {
        if !self.exists(spec.base()) {
            return Some(spec.base());
        }
        if spec.force() {
            return None;
        }
        spec.datasets().iter().skip(1).find(|d| !self.exists(d))
    }
}
