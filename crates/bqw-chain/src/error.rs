//! Error types for bqw-chain

use bqw_core::{DatasetRef, TableName};
use bqw_db::DbError;
use thiserror::Error;

/// Chain planning and execution errors
///
/// `InvalidChainSpec`, `MissingDataset`, and `Warehouse` abort the whole
/// chain before anything is written. `DatasetCreationFailed` and
/// `OperationFailed` never abort a run; they become the reason text of a
/// dataset event or a `Failed` outcome.
#[derive(Error, Debug)]
pub enum ChainError {
    /// C001: Malformed chain input
    #[error("[C001] Invalid chain: {reason}")]
    InvalidChainSpec { reason: String },

    /// C002: Dataset absent and not allowed to be created
    #[error("[C002] Dataset {dataset} does not exist. Use --force to create it.")]
    MissingDataset { dataset: DatasetRef },

    /// C003: Dataset creation gave up
    #[error("[C003] Failed to create dataset {dataset} after {attempts} attempt(s): {source}")]
    DatasetCreationFailed {
        dataset: DatasetRef,
        attempts: u32,
        source: DbError,
    },

    /// C004: View upsert gave up
    #[error("[C004] Failed to create view {target}.{table} after {attempts} attempt(s): {source}")]
    OperationFailed {
        target: DatasetRef,
        table: TableName,
        attempts: u32,
        source: DbError,
    },

    /// C005: Reading remote state failed before planning
    #[error("[C005] {context}: {source}")]
    Warehouse { context: String, source: DbError },
}

impl ChainError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ChainError::InvalidChainSpec {
            reason: reason.into(),
        }
    }
}
