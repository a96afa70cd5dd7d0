//! Dataset chain and expose commands

use anyhow::Result;
use bqw_chain::{
    load_allow_list, plan, ChainError, ChainExecutor, ChainObserver, ChainResult, ChainSnapshot,
    ChainSpec, DatasetEvent, DatasetEventKind, Outcome, RetryPolicy, TableOutcome,
};
use bqw_core::BackendType;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::{ChainArgs, ExposeArgs, GlobalArgs, OutputFormat};
use crate::commands::common::{column_width, print_json, ExitCode, EXIT_CANCELLED, EXIT_FAILURES};
use crate::context::RuntimeContext;
use crate::shutdown::ShutdownCoordinator;

/// Execute the chain command
pub async fn execute(args: &ChainArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;

    let allow_list = args
        .tables_csv
        .as_deref()
        .map(load_allow_list)
        .transpose()?;
    let spec = ChainSpec::parse(&args.datasets, ctx.project.as_ref(), allow_list, args.force)?;

    run(&ctx, spec, args.concurrency, args.output).await
}

/// Execute the expose command: a chain of exactly two datasets
pub async fn expose(args: &ExposeArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let names = vec![args.source.clone(), args.target.clone()];
    let spec = ChainSpec::parse(&names, ctx.project.as_ref(), None, args.force)?;

    run(&ctx, spec, None, args.output).await
}

async fn run(
    ctx: &RuntimeContext,
    spec: ChainSpec,
    concurrency: Option<usize>,
    output: OutputFormat,
) -> Result<()> {
    let spec = spec.with_exclusions(&ctx.config.chain.exclude_tables)?;
    if ctx.backend == BackendType::BigQuery {
        if let Some(bare) = spec.unqualified().next() {
            return Err(ChainError::InvalidChainSpec {
                reason: format!(
                    "dataset '{}' has no project. Pass --project, set GOOGLE_CLOUD_PROJECT, \
                     or run `bqwizard config set-project`",
                    bare
                ),
            }
            .into());
        }
    }

    let policy = RetryPolicy::from_config(&ctx.config.chain);
    let snapshot = ChainSnapshot::capture(&spec, ctx.warehouse.as_ref(), &policy).await?;
    let plan = plan(&spec, &snapshot)?;

    let text = output == OutputFormat::Text;
    if text {
        for warning in &plan.warnings {
            eprintln!("Warning: {}", warning);
        }
        println!(
            "Chaining {} tables through {} datasets: {}",
            plan.table_count(),
            spec.datasets().len(),
            spec.datasets()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        );
    }

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let progress = Arc::new(ProgressObserver::new(plan.operations.len(), text));
    let executor = ChainExecutor::new(ctx.warehouse.clone(), policy)
        .with_concurrency(concurrency.unwrap_or(ctx.config.chain.concurrency))
        .with_location(ctx.config.location.clone())
        .with_cancellation(shutdown.cancel_token())
        .with_observer(progress.clone());

    let result = executor.execute(&plan, spec.force()).await;
    progress.finish();

    match output {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_result(&result),
    }

    if result.was_cancelled() {
        return Err(ExitCode(EXIT_CANCELLED).into());
    }
    if result.has_failures() {
        return Err(ExitCode(EXIT_FAILURES).into());
    }
    Ok(())
}

/// Drives a progress bar from executor callbacks
struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    fn new(total: usize, enabled: bool) -> Self {
        let bar = (enabled && total > 0).then(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(concat!(
                        "{spinner:.green} [{elapsed_precise}] ",
                        "[{bar:40.cyan/blue}] {pos}/{len} {msg}"
                    ))
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });
        Self { bar }
    }

    fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}

impl ChainObserver for ProgressObserver {
    fn on_dataset_event(&self, event: &DatasetEvent) {
        let line = match &event.kind {
            DatasetEventKind::Created => format!("Created dataset {}", event.dataset),
            DatasetEventKind::CreationFailed(reason) => reason.clone(),
        };
        match &self.bar {
            Some(pb) => pb.println(line),
            None => log::info!("{}", line),
        }
    }

    fn on_outcome(&self, outcome: &TableOutcome) {
        if let Some(pb) = &self.bar {
            pb.set_message(outcome.target_dataset.table_path(&outcome.table_name));
            pb.inc(1);
        }
    }
}

fn print_result(result: &ChainResult) {
    if !result.outcomes.is_empty() {
        let targets: Vec<String> = result
            .outcomes
            .iter()
            .map(|o| o.target_dataset.to_string())
            .collect();
        let target_width = column_width("TARGET", targets.iter().map(String::as_str));
        let table_width = column_width(
            "TABLE",
            result.outcomes.iter().map(|o| o.table_name.as_str()),
        );

        println!();
        println!(
            "{:<3}  {:<target_width$}  {:<table_width$}  OUTCOME",
            "HOP",
            "TARGET",
            "TABLE",
            target_width = target_width,
            table_width = table_width
        );
        println!(
            "{:-<3}  {:-<target_width$}  {:-<table_width$}  {}",
            "",
            "",
            "",
            "-".repeat(25),
            target_width = target_width,
            table_width = table_width
        );
        for (outcome, target) in result.outcomes.iter().zip(&targets) {
            println!(
                "{:<3}  {:<target_width$}  {:<table_width$}  {}",
                outcome.hop,
                target,
                outcome.table_name.as_str(),
                outcome.outcome.label(),
                target_width = target_width,
                table_width = table_width
            );
        }

        let failures: Vec<(&TableOutcome, &str)> = result
            .outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Failed(reason) => Some((o, reason.as_str())),
                _ => None,
            })
            .collect();
        if !failures.is_empty() {
            println!("\nFailures:");
            for (outcome, reason) in failures {
                println!(
                    "  {}: {}",
                    outcome.target_dataset.table_path(&outcome.table_name),
                    reason
                );
            }
        }
    }

    println!();
    println!("{}", result.summary);
    if let Some(secs) = result.duration_secs() {
        println!("Finished in {:.2}s", secs);
    }
}
