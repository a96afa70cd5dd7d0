//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// BQWizard - dataset discovery and view chains for BigQuery
#[derive(Parser, Debug)]
#[command(name = "bqwizard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Default project for bare dataset names
    #[arg(short, long, global = true, env = "GOOGLE_CLOUD_PROJECT")]
    pub project: Option<String>,

    /// Override the warehouse backend
    #[arg(short, long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    /// DuckDB database path (implies --backend duckdb)
    #[arg(short, long, global = true)]
    pub database: Option<String>,
}

/// Backend selection on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// BigQuery REST API
    #[value(name = "bigquery")]
    BigQuery,
    /// Local DuckDB database
    #[value(name = "duckdb")]
    DuckDb,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage datasets and dataset chains
    #[command(subcommand)]
    Dataset(DatasetCommands),

    /// Manage BQWizard configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Dataset subcommands
#[derive(Subcommand, Debug)]
pub enum DatasetCommands {
    /// List datasets in a project
    Ls(LsArgs),

    /// List tables in a dataset
    Tables(TablesArgs),

    /// Show dataset metadata and tables (all datasets when none is given)
    Describe(DescribeArgs),

    /// Create a dataset
    Create(CreateArgs),

    /// Delete a dataset and everything in it
    Delete(DeleteArgs),

    /// Create views in TARGET for every table of SOURCE
    Expose(ExposeArgs),

    /// Chain views through an ordered list of datasets
    Chain(ChainArgs),
}

/// Output formats for listing and chain commands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned text columns
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Project to list (default: the active project)
    #[arg(value_name = "PROJECT")]
    pub in_project: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the tables command
#[derive(Args, Debug)]
pub struct TablesArgs {
    /// Dataset as `dataset` or `project.dataset`
    pub dataset: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the describe command
#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Dataset as `dataset` or `project.dataset`
    pub dataset: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the create command
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Dataset as `dataset` or `project.dataset`
    pub dataset: String,

    /// Location for the new dataset (default: config `location`)
    #[arg(short, long)]
    pub location: Option<String>,
}

/// Arguments for the delete command
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Dataset as `dataset` or `project.dataset`
    pub dataset: String,

    /// Confirm deletion of the dataset and all of its contents
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the expose command
#[derive(Args, Debug)]
pub struct ExposeArgs {
    /// Source dataset
    pub source: String,

    /// Target dataset
    pub target: String,

    /// Create the target dataset if it does not exist
    #[arg(short, long)]
    pub force: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the chain command
#[derive(Args, Debug)]
pub struct ChainArgs {
    /// Datasets in chain order; the first one holds the tables
    #[arg(required = true, num_args = 2..)]
    pub datasets: Vec<String>,

    /// Create target datasets that do not exist
    #[arg(short, long)]
    pub force: bool,

    /// Single-column CSV of table names to chain
    #[arg(short, long)]
    pub tables_csv: Option<PathBuf>,

    /// View upserts in flight at once within a hop (default: config)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Set the default project
    SetProject(SetProjectArgs),
}

/// Arguments for the set-project command
#[derive(Args, Debug)]
pub struct SetProjectArgs {
    /// Project ID
    #[arg(value_name = "PROJECT")]
    pub project_id: String,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
