//! bqw-core - Core library for BQWizard
//!
//! This crate provides the strongly-typed warehouse identifiers, the user
//! configuration file, and the error types shared by every BQWizard crate.

pub mod config;
pub mod dataset_ref;
pub mod error;
mod newtype_string;

pub use config::{BackendConfig, BackendType, ChainConfig, Config};
pub use dataset_ref::{DatasetName, DatasetRef, ProjectId, TableName};
pub use error::{CoreError, CoreResult};
