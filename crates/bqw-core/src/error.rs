//! Error types for bqw-core

use thiserror::Error;

/// Core error type for BQWizard
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Invalid configuration value
    #[error("[E002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E003: Identifier failed validation
    #[error("[E003] Invalid {kind} '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// E004: IO error
    #[error("[E004] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E005: IO error with file path context
    #[error("[E005] Failed to access '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E006: YAML parse error
    #[error("[E006] Config parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
