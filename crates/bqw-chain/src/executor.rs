//! Chain execution
//!
//! Hops run one after another. Within a hop, view upserts run with bounded
//! concurrency and their outcomes are collected in plan order before the
//! next hop starts.

use crate::error::ChainError;
use crate::planner::{ChainOperation, ChainPlan, Hop};
use crate::result::{ChainResult, DatasetEvent, DatasetEventKind, Outcome, TableOutcome};
use crate::retry::{with_retry, RetryPolicy};
use bqw_core::DatasetRef;
use bqw_db::Warehouse;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Progress callbacks fired while a chain executes
pub trait ChainObserver: Send + Sync {
    fn on_dataset_event(&self, _event: &DatasetEvent) {}

    fn on_outcome(&self, _outcome: &TableOutcome) {}
}

struct NoopObserver;

impl ChainObserver for NoopObserver {}

/// Applies a [`ChainPlan`] to a warehouse
pub struct ChainExecutor {
    warehouse: Arc<dyn Warehouse>,
    policy: RetryPolicy,
    concurrency: usize,
    location: String,
    cancel: CancellationToken,
    observer: Arc<dyn ChainObserver>,
}

impl ChainExecutor {
    pub fn new(warehouse: Arc<dyn Warehouse>, policy: RetryPolicy) -> Self {
        Self {
            warehouse,
            policy,
            concurrency: 1,
            location: "US".to_string(),
            cancel: CancellationToken::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Upserts in flight at once within a hop; 0 is treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Location for datasets created with `force`.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ChainObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Apply every operation of `plan`, producing exactly one outcome each.
    ///
    /// Never fails as a whole: dataset creation and upsert errors are
    /// recorded and the run moves on.
    pub async fn execute(&self, plan: &ChainPlan, force: bool) -> ChainResult {
        let mut result = ChainResult::new(plan.warnings.clone());
        // Datasets that never materialized; every later hop reading from
        // them is skipped.
        let mut unavailable: BTreeSet<DatasetRef> = BTreeSet::new();

        log::info!(
            "Executing {} operations over {} hops on {}",
            plan.operations.len(),
            plan.hops.len(),
            self.warehouse.backend_type()
        );

        for hop in &plan.hops {
            let operations: Vec<&ChainOperation> = plan.operations_for(hop.index).collect();

            let outcomes = if self.cancel.is_cancelled() {
                settle(&operations, Outcome::Cancelled)
            } else if self.prepare_target(hop, force, &mut unavailable, &mut result).await {
                self.run_hop(&operations).await
            } else if self.cancel.is_cancelled() {
                settle(&operations, Outcome::Cancelled)
            } else {
                settle(&operations, Outcome::SkippedDatasetMissing)
            };

            for outcome in outcomes {
                self.observer.on_outcome(&outcome);
                result.record(outcome);
            }
        }

        let result = result.finish();
        log::info!("{}", result.summary);
        result
    }

    /// Make sure the hop's target dataset exists, creating it with `force`.
    ///
    /// Returns whether operations of this hop may be issued.
    async fn prepare_target(
        &self,
        hop: &Hop,
        force: bool,
        unavailable: &mut BTreeSet<DatasetRef>,
        result: &mut ChainResult,
    ) -> bool {
        if unavailable.contains(&hop.source) {
            log::warn!(
                "Skipping hop {} ({} -> {}): {} is unavailable",
                hop.index,
                hop.source,
                hop.target,
                hop.source
            );
            unavailable.insert(hop.target.clone());
            return false;
        }
        if hop.target_exists {
            return true;
        }
        if !force {
            unavailable.insert(hop.target.clone());
            return false;
        }

        let label = format!("Creating dataset {}", hop.target);
        let warehouse = self.warehouse.as_ref();
        let target = &hop.target;
        let location = self.location.as_str();
        let created = with_retry(&self.policy, &label, &self.cancel, move || {
            warehouse.create_dataset(target, location)
        })
        .await;

        let kind = match created {
            Err(failure) if failure.cancelled => {
                log::info!("Creation of {} abandoned, run cancelled", hop.target);
                unavailable.insert(hop.target.clone());
                return false;
            }
            Ok(()) => {
                log::info!("Created dataset {} in {}", hop.target, self.location);
                DatasetEventKind::Created
            }
            Err(failure) => {
                let err = ChainError::DatasetCreationFailed {
                    dataset: hop.target.clone(),
                    attempts: failure.attempts,
                    source: failure.error,
                };
                log::warn!("{}", err);
                unavailable.insert(hop.target.clone());
                DatasetEventKind::CreationFailed(err.to_string())
            }
        };
        let ready = kind == DatasetEventKind::Created;
        let event = DatasetEvent {
            hop: hop.index,
            dataset: hop.target.clone(),
            kind,
        };
        self.observer.on_dataset_event(&event);
        result.record_dataset(event);
        ready
    }

    async fn run_hop(&self, operations: &[&ChainOperation]) -> Vec<TableOutcome> {
        stream::iter(operations.iter().copied())
            .map(|op| async move { TableOutcome::new(op, self.apply(op).await) })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn apply(&self, op: &ChainOperation) -> Outcome {
        if let Some(pattern) = &op.excluded_by {
            log::debug!("Skipping {} (matches '{}')", op.table_name, pattern);
            return Outcome::SkippedFiltered;
        }
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let label = format!(
            "Creating view {}",
            op.target_dataset.table_path(&op.table_name)
        );
        let warehouse = self.warehouse.as_ref();
        let upserted = with_retry(&self.policy, &label, &self.cancel, move || {
            warehouse.create_or_replace_view(
                &op.target_dataset,
                &op.table_name,
                &op.source_dataset,
                &op.table_name,
            )
        })
        .await;

        match upserted {
            Ok(()) if op.target_exists => Outcome::Updated,
            Ok(()) => Outcome::Created,
            Err(failure) if failure.cancelled => Outcome::Cancelled,
            Err(failure) => {
                let err = ChainError::OperationFailed {
                    target: op.target_dataset.clone(),
                    table: op.table_name.clone(),
                    attempts: failure.attempts,
                    source: failure.error,
                };
                log::warn!("{}", err);
                Outcome::Failed(err.to_string())
            }
        }
    }
}

/// Outcomes for a hop that never runs. Filtered tables stay filtered.
fn settle(operations: &[&ChainOperation], outcome: Outcome) -> Vec<TableOutcome> {
    operations
        .iter()
        .map(|op| {
            let outcome = if op.excluded_by.is_some() {
                Outcome::SkippedFiltered
            } else {
                outcome.clone()
            };
            TableOutcome::new(op, outcome)
        })
        .collect()
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
