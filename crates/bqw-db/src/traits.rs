//! Warehouse trait definition

use crate::error::DbResult;
use async_trait::async_trait;
use bqw_core::{DatasetRef, ProjectId, TableName};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of relation listed in a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
    External,
    MaterializedView,
    Snapshot,
    Other(String),
}

impl TableKind {
    /// Map a backend's table type label onto a kind.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "TABLE" | "BASE TABLE" => TableKind::Table,
            "VIEW" => TableKind::View,
            "EXTERNAL" => TableKind::External,
            "MATERIALIZED_VIEW" => TableKind::MaterializedView,
            "SNAPSHOT" => TableKind::Snapshot,
            other => TableKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Table => write!(f, "TABLE"),
            TableKind::View => write!(f, "VIEW"),
            TableKind::External => write!(f, "EXTERNAL"),
            TableKind::MaterializedView => write!(f, "MATERIALIZED_VIEW"),
            TableKind::Snapshot => write!(f, "SNAPSHOT"),
            TableKind::Other(s) => f.write_str(s),
        }
    }
}

/// One entry of a dataset's table inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: TableName,
    pub kind: TableKind,
}

/// Dataset metadata returned by [`Warehouse::describe_dataset`]
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub dataset: DatasetRef,
    pub description: Option<String>,
    pub location: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub tables: Vec<TableInfo>,
}

/// Warehouse abstraction trait for BQWizard
///
/// Implementations must be Send + Sync so one backend can serve
/// concurrent view upserts within a chain hop.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Check if a dataset exists
    async fn dataset_exists(&self, dataset: &DatasetRef) -> DbResult<bool>;

    /// List datasets in a project (the backend's default when `None`)
    async fn list_datasets(&self, project: Option<&ProjectId>) -> DbResult<Vec<DatasetRef>>;

    /// List tables and views in a dataset
    async fn list_tables(&self, dataset: &DatasetRef) -> DbResult<Vec<TableInfo>>;

    /// Dataset metadata together with its tables
    async fn describe_dataset(&self, dataset: &DatasetRef) -> DbResult<DatasetInfo>;

    /// Create a dataset; succeeds if it already exists
    async fn create_dataset(&self, dataset: &DatasetRef, location: &str) -> DbResult<()>;

    /// Delete a dataset and everything in it; succeeds if it is already gone
    async fn delete_dataset(&self, dataset: &DatasetRef) -> DbResult<()>;

    /// Create or replace `target.view` as `SELECT * FROM source.table`
    async fn create_or_replace_view(
        &self,
        target: &DatasetRef,
        view: &TableName,
        source: &DatasetRef,
        table: &TableName,
    ) -> DbResult<()>;

    /// Backend identifier for logging
    fn backend_type(&self) -> &'static str;

    /// The dataset this backend actually addresses for `dataset`.
    ///
    /// Two refs with the same canonical form name the same remote dataset.
    fn canonical(&self, dataset: &DatasetRef) -> DatasetRef {
        dataset.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_kind_from_label() {
        assert_eq!(TableKind::from_label("TABLE"), TableKind::Table);
        assert_eq!(TableKind::from_label("BASE TABLE"), TableKind::Table);
        assert_eq!(TableKind::from_label("view"), TableKind::View);
        assert_eq!(
            TableKind::from_label("MATERIALIZED_VIEW"),
            TableKind::MaterializedView
        );
        assert_eq!(
            TableKind::from_label("LOCAL TEMPORARY"),
            TableKind::Other("LOCAL TEMPORARY".to_string())
        );
    }

    #[test]
    fn test_table_kind_display_round_trips_label() {
        for label in ["TABLE", "VIEW", "EXTERNAL", "SNAPSHOT"] {
            assert_eq!(TableKind::from_label(label).to_string(), label);
        }
    }
}
