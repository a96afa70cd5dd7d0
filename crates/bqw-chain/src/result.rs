//! Chain execution results

use crate::planner::{ChainOperation, PlanWarning};
use bqw_core::{DatasetRef, TableName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Terminal state of one chain operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// View did not exist at plan time and was created
    Created,
    /// View existed at plan time and was replaced
    Updated,
    /// Table matched an exclusion pattern
    SkippedFiltered,
    /// Target dataset was missing and could not or may not be created
    SkippedDatasetMissing,
    /// Gave up after retries, or hit a permanent error
    Failed(String),
    /// Never issued because the run was interrupted
    Cancelled,
}

impl Outcome {
    /// Short label for tables and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::SkippedFiltered => "skipped (filtered)",
            Outcome::SkippedDatasetMissing => "skipped (dataset missing)",
            Outcome::Failed(_) => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Outcome of one operation together with what it targeted
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub hop: usize,
    pub source_dataset: DatasetRef,
    pub target_dataset: DatasetRef,
    pub table_name: TableName,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TableOutcome {
    pub fn new(op: &ChainOperation, outcome: Outcome) -> Self {
        Self {
            hop: op.hop,
            source_dataset: op.source_dataset.clone(),
            target_dataset: op.target_dataset.clone(),
            table_name: op.table_name.clone(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DatasetEventKind {
    Created,
    CreationFailed(String),
}

/// Something that happened to a target dataset during execution
#[derive(Debug, Clone, Serialize)]
pub struct DatasetEvent {
    pub hop: usize,
    pub dataset: DatasetRef,
    #[serde(flatten)]
    pub kind: DatasetEventKind,
}

/// Per-outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped_filtered: usize,
    pub skipped_dataset_missing: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl ChainSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_filtered + self.skipped_dataset_missing
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped() + self.failed + self.cancelled
    }
}

impl fmt::Display for ChainSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Completed: {} created, {} updated, {} skipped, {} failed",
            self.created,
            self.updated,
            self.skipped(),
            self.failed
        )?;
        if self.cancelled > 0 {
            write!(f, ", {} cancelled", self.cancelled)?;
        }
        Ok(())
    }
}

/// Everything a chain run produced, one outcome per planned operation
#[derive(Debug, Clone, Serialize)]
pub struct ChainResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub warnings: Vec<PlanWarning>,
    pub datasets: Vec<DatasetEvent>,
    pub outcomes: Vec<TableOutcome>,
    pub summary: ChainSummary,
}

impl ChainResult {
    pub fn new(warnings: Vec<PlanWarning>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            warnings,
            datasets: Vec::new(),
            outcomes: Vec::new(),
            summary: ChainSummary::default(),
        }
    }

    pub fn record(&mut self, outcome: TableOutcome) {
        let summary = &mut self.summary;
        match &outcome.outcome {
            Outcome::Created => summary.created += 1,
            Outcome::Updated => summary.updated += 1,
            Outcome::SkippedFiltered => summary.skipped_filtered += 1,
            Outcome::SkippedDatasetMissing => summary.skipped_dataset_missing += 1,
            Outcome::Failed(_) => summary.failed += 1,
            Outcome::Cancelled => summary.cancelled += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn record_dataset(&mut self, event: DatasetEvent) {
        self.datasets.push(event);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn was_cancelled(&self) -> bool {
        self.summary.cancelled > 0
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(hop: usize, table: &str) -> ChainOperation {
        ChainOperation {
            hop,
            source_dataset: DatasetRef::parse("raw", None).unwrap(),
            target_dataset: DatasetRef::parse("staging", None).unwrap(),
            table_name: TableName::try_new(table).unwrap(),
            target_exists: false,
            excluded_by: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut result = ChainResult::new(vec![]);
        result.record(TableOutcome::new(&op(1, "a"), Outcome::Created));
        result.record(TableOutcome::new(&op(1, "b"), Outcome::Updated));
        result.record(TableOutcome::new(&op(1, "c"), Outcome::SkippedFiltered));
        result.record(TableOutcome::new(&op(1, "d"), Outcome::SkippedDatasetMissing));
        result.record(TableOutcome::new(&op(1, "e"), Outcome::Failed("boom".into())));

        assert_eq!(result.summary.total(), 5);
        assert_eq!(result.summary.skipped(), 2);
        assert!(result.has_failures());
        assert!(!result.was_cancelled());
        assert_eq!(
            result.summary.to_string(),
            "Completed: 1 created, 1 updated, 2 skipped, 1 failed"
        );
    }

    #[test]
    fn test_skips_are_not_failures() {
        let mut result = ChainResult::new(vec![]);
        result.record(TableOutcome::new(&op(1, "a"), Outcome::SkippedDatasetMissing));
        assert!(!result.has_failures());
    }

    #[test]
    fn test_cancelled_in_summary() {
        let mut result = ChainResult::new(vec![]);
        result.record(TableOutcome::new(&op(1, "a"), Outcome::Cancelled));
        assert!(result.was_cancelled());
        assert!(result.summary.to_string().ends_with(", 1 cancelled"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Created.to_string(), "created");
        assert_eq!(
            Outcome::Failed("[D003] Not found: x".into()).to_string(),
            "failed: [D003] Not found: x"
        );
    }

    #[test]
    fn test_json_shape() {
        let mut result = ChainResult::new(vec![]);
        result.record(TableOutcome::new(&op(1, "a"), Outcome::Failed("denied".into())));
        result.record(TableOutcome::new(&op(1, "b"), Outcome::Created));
        let json = serde_json::to_value(result.finish()).unwrap();

        assert_eq!(json["outcomes"][0]["status"], "failed");
        assert_eq!(json["outcomes"][0]["reason"], "denied");
        assert_eq!(json["outcomes"][0]["table_name"], "a");
        assert_eq!(json["outcomes"][1]["status"], "created");
        assert_eq!(json["summary"]["created"], 1);
        assert!(json["finished_at"].is_string());
    }
}
