//! BQWizard CLI - dataset discovery and view chains for BigQuery

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod context;
mod shutdown;

use cli::{Cli, Commands};
use commands::common::ExitCode;
use commands::{config, dataset};

const VERBOSE_FILTER: &str = "warn,bqw_core=debug,bqw_db=debug,bqw_chain=debug,bqwizard=debug";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(err) = run(&cli).await {
        if let Some(ExitCode(code)) = err.downcast_ref::<ExitCode>() {
            std::process::exit(*code);
        }
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Dataset(cmd) => dataset::execute(cmd, &cli.global).await,
        Commands::Config(cmd) => config::execute(cmd, &cli.global).await,
    }
}

/// Route `log` records to stderr. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
