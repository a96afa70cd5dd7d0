//! Runtime context for CLI commands

use anyhow::{Context, Result};
use bqw_core::{BackendType, Config, DatasetRef, ProjectId};
use bqw_db::{BigQueryBackend, DuckDbBackend, Warehouse};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{BackendArg, GlobalArgs};

/// Runtime context containing the effective configuration and a warehouse
pub struct RuntimeContext {
    /// Configuration after command-line overrides
    pub config: Config,

    /// Project used to qualify bare dataset names
    pub project: Option<ProjectId>,

    /// Backend in use
    pub backend: BackendType,

    /// Warehouse connection
    pub warehouse: Arc<dyn Warehouse>,
}

impl RuntimeContext {
    /// Create a new runtime context from global arguments
    pub fn new(global: &GlobalArgs) -> Result<Self> {
        let config = load_config(global)?;
        let project = resolve_project(global, &config)?;
        let backend = resolve_backend(global, &config);

        let warehouse: Arc<dyn Warehouse> = match backend {
            BackendType::DuckDb => {
                let path = global.database.as_deref().unwrap_or(&config.backend.path);
                log::debug!("Opening DuckDB database {}", path);
                Arc::new(DuckDbBackend::new(path).context("Failed to open DuckDB database")?)
            }
            BackendType::BigQuery => {
                log::debug!("Using BigQuery at {}", config.backend.api_root);
                Arc::new(
                    BigQueryBackend::from_env(
                        &config.backend.api_root,
                        project.clone(),
                        config.chain.timeout(),
                    )
                    .context("Failed to set up the BigQuery client")?,
                )
            }
        };

        Ok(Self {
            config,
            project,
            backend,
            warehouse,
        })
    }

    /// Parse a dataset name typed by the user, qualifying bare names.
    pub fn dataset(&self, name: &str) -> Result<DatasetRef> {
        match self.backend {
            BackendType::BigQuery => DatasetRef::parse_qualified(name, self.project.as_ref())
                .with_context(|| {
                    format!(
                        "Invalid BigQuery dataset '{}'. Bare names need --project, \
                         GOOGLE_CLOUD_PROJECT, or `bqwizard config set-project`",
                        name
                    )
                }),
            BackendType::DuckDb => DatasetRef::parse(name, self.project.as_ref())
                .with_context(|| format!("Invalid dataset name '{}'", name)),
        }
    }

    /// Human-readable name of the active project.
    pub fn project_label(&self) -> String {
        match (&self.project, self.backend) {
            (Some(project), _) => project.to_string(),
            (None, BackendType::DuckDb) => "local".to_string(),
            (None, BackendType::BigQuery) => "(no project)".to_string(),
        }
    }
}

/// Path of the config file: `--config`, else the per-user default.
pub(crate) fn config_path(global: &GlobalArgs) -> Result<PathBuf> {
    match &global.config {
        Some(path) => Ok(path.clone()),
        None => Config::default_path().context("Failed to locate the config directory"),
    }
}

/// Load the config file. An explicit `--config` must exist; the default
/// location falls back to built-in defaults.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    let path = config_path(global)?;
    let config = if global.config.is_some() {
        Config::load(&path)
    } else {
        Config::load_or_default(&path)
    }
    .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok(config)
}

/// `--project` (or `GOOGLE_CLOUD_PROJECT`) wins over the config file.
fn resolve_project(global: &GlobalArgs, config: &Config) -> Result<Option<ProjectId>> {
    match &global.project {
        Some(project) => Ok(Some(
            ProjectId::try_new(project.as_str()).context("Invalid --project")?,
        )),
        None => config
            .project_id()
            .context("Invalid project in configuration"),
    }
}

fn resolve_backend(global: &GlobalArgs, config: &Config) -> BackendType {
    match (global.backend, &global.database) {
        (Some(BackendArg::BigQuery), _) => BackendType::BigQuery,
        (Some(BackendArg::DuckDb), _) | (None, Some(_)) => BackendType::DuckDb,
        (None, None) => config.backend.backend_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn global() -> GlobalArgs {
        GlobalArgs {
            verbose: false,
            config: None,
            project: None,
            backend: None,
            database: None,
        }
    }

    #[test]
    fn test_backend_resolution() {
        let config = Config::default();
        assert_eq!(resolve_backend(&global(), &config), BackendType::BigQuery);

        let with_db = GlobalArgs {
            database: Some("x.duckdb".into()),
            ..global()
        };
        assert_eq!(resolve_backend(&with_db, &config), BackendType::DuckDb);

        let forced = GlobalArgs {
            backend: Some(BackendArg::BigQuery),
            database: Some("x.duckdb".into()),
            ..global()
        };
        assert_eq!(resolve_backend(&forced, &config), BackendType::BigQuery);
    }

    #[test]
    fn test_flag_project_wins() {
        let config = Config {
            project: Some("from-config".into()),
            ..Config::default()
        };
        let flagged = GlobalArgs {
            project: Some("from-flag".into()),
            ..global()
        };
        let project = resolve_project(&flagged, &config).unwrap().unwrap();
        assert_eq!(project, "from-flag");

        let project = resolve_project(&global(), &config).unwrap().unwrap();
        assert_eq!(project, "from-config");
    }

    #[test]
    fn test_invalid_flag_project() {
        let flagged = GlobalArgs {
            project: Some("Bad Project".into()),
            ..global()
        };
        assert!(resolve_project(&flagged, &Config::default()).is_err());
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let args = GlobalArgs {
            config: Some(dir.path().join("missing.yml")),
            ..global()
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_duckdb_context_allows_bare_names() {
        let dir = TempDir::new().unwrap();
        let config_file = dir.path().join("bqwizard.yml");
        std::fs::write(&config_file, "backend:\n  type: duckdb\n").unwrap();
        let args = GlobalArgs {
            config: Some(config_file),
            ..global()
        };

        let ctx = RuntimeContext::new(&args).unwrap();
        assert_eq!(ctx.backend, BackendType::DuckDb);
        assert_eq!(ctx.dataset("raw").unwrap().to_string(), "raw");
        assert_eq!(ctx.project_label(), "local");
        assert!(ctx.dataset("not-valid").is_err());
    }

    #[test]
    fn test_bigquery_context_requires_projects() {
        let mut ctx = RuntimeContext {
            config: Config::default(),
            project: None,
            backend: BackendType::BigQuery,
            warehouse: Arc::new(DuckDbBackend::new(":memory:").unwrap()),
        };
        let err = ctx.dataset("raw").unwrap_err();
        assert!(format!("{:#}", err).contains("--project"));
        assert_eq!(ctx.dataset("acme.raw").unwrap().to_string(), "acme.raw");

        ctx.project = Some(ProjectId::try_new("acme").unwrap());
        assert_eq!(ctx.dataset("raw").unwrap().to_string(), "acme.raw");
    }
}
