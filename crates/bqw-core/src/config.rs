//! Configuration types and parsing for bqwizard.yml

use crate::dataset_ref::ProjectId;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the user configuration
pub const CONFIG_FILE_NAME: &str = "bqwizard.yml";

/// Default BigQuery REST root
pub const DEFAULT_API_ROOT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// User configuration from bqwizard.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default project used to qualify bare dataset names
    #[serde(default)]
    pub project: Option<String>,

    /// Location for datasets created by BQWizard
    #[serde(default = "default_location")]
    pub location: String,

    /// Warehouse backend selection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Dataset chain execution settings
    #[serde(default)]
    pub chain: ChainConfig,
}

/// Warehouse backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// BigQuery REST API (default)
    #[default]
    BigQuery,
    /// Local DuckDB database, datasets map to schemas
    DuckDb,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::BigQuery => write!(f, "bigquery"),
            BackendType::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Backend type (bigquery or duckdb)
    #[serde(rename = "type", default)]
    pub backend_type: BackendType,

    /// DuckDB database path (file-based or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,

    /// BigQuery REST root, overridable for emulators
    #[serde(default = "default_api_root")]
    pub api_root: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            path: default_db_path(),
            api_root: default_api_root(),
        }
    }
}

/// Retry, concurrency, and filtering settings for `dataset chain`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Total attempts per remote call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// View upserts in flight at once within a hop
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout applied to every remote call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Glob patterns of table names that are never chained
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            exclude_tables: Vec::new(),
        }
    }
}

impl ChainConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_location() -> String {
    "US".to_string()
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

fn default_api_root() -> String {
    DEFAULT_API_ROOT.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    4_000
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: None,
            location: default_location(),
            backend: BackendConfig::default(),
            chain: ChainConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Location of the per-user config file
    pub fn default_path() -> CoreResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("bqwizard").join(CONFIG_FILE_NAME))
            .ok_or_else(|| CoreError::ConfigInvalid {
                message: "Could not determine the user config directory".to_string(),
            })
    }

    /// Write the configuration, creating parent directories as needed
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::IoWithPath {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if let Some(project) = &self.project {
            ProjectId::try_new(project.as_str())?;
        }

        if self.location.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "location cannot be empty".to_string(),
            });
        }

        if self.chain.max_attempts == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "chain.max_attempts must be at least 1".to_string(),
            });
        }

        if self.chain.concurrency == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "chain.concurrency must be at least 1".to_string(),
            });
        }

        if self.chain.timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "chain.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.chain.initial_backoff_ms > self.chain.max_backoff_ms {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "chain.initial_backoff_ms ({}) exceeds chain.max_backoff_ms ({})",
                    self.chain.initial_backoff_ms, self.chain.max_backoff_ms
                ),
            });
        }

        Ok(())
    }

    /// The configured default project, validated
    pub fn project_id(&self) -> CoreResult<Option<ProjectId>> {
        self.project
            .as_deref()
            .map(ProjectId::try_new)
            .transpose()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
