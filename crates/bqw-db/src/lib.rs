//! bqw-db - Warehouse abstraction layer for BQWizard
//!
//! This crate provides the `Warehouse` trait and implementations for the
//! BigQuery REST API and for a local DuckDB database (datasets as schemas).

pub mod bigquery;
pub mod duckdb;
pub mod error;
pub(crate) mod sql;
pub mod traits;

pub use bigquery::BigQueryBackend;
pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{DatasetInfo, TableInfo, TableKind, Warehouse};
