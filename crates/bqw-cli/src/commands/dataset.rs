//! Dataset discovery and CRUD commands

use anyhow::{bail, Context, Result};
use bqw_core::ProjectId;
use bqw_db::{DatasetInfo, TableInfo};

use crate::cli::{
    CreateArgs, DatasetCommands, DeleteArgs, DescribeArgs, GlobalArgs, LsArgs, OutputFormat,
    TablesArgs,
};
use crate::commands::chain;
use crate::commands::common::{column_width, print_json};
use crate::context::RuntimeContext;

/// Execute a dataset subcommand
pub async fn execute(command: &DatasetCommands, global: &GlobalArgs) -> Result<()> {
    match command {
        DatasetCommands::Ls(args) => ls(args, global).await,
        DatasetCommands::Tables(args) => tables(args, global).await,
        DatasetCommands::Describe(args) => describe(args, global).await,
        DatasetCommands::Create(args) => create(args, global).await,
        DatasetCommands::Delete(args) => delete(args, global).await,
        DatasetCommands::Expose(args) => chain::expose(args, global).await,
        DatasetCommands::Chain(args) => chain::execute(args, global).await,
    }
}

async fn ls(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let project = args
        .in_project
        .as_deref()
        .map(ProjectId::try_new)
        .transpose()
        .context("Invalid project")?;
    let label = project
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| ctx.project_label());

    let datasets = ctx
        .warehouse
        .list_datasets(project.as_ref())
        .await
        .with_context(|| format!("Failed to list datasets in {}", label))?;

    if args.output == OutputFormat::Json {
        return print_json(&datasets);
    }

    if datasets.is_empty() {
        println!("{} does not contain any datasets.", label);
        return Ok(());
    }

    println!("Datasets in {}:", label);
    for dataset in &datasets {
        println!("  {}", dataset.dataset);
    }
    println!("\n{} datasets", datasets.len());
    Ok(())
}

async fn tables(args: &TablesArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let dataset = ctx.dataset(&args.dataset)?;
    let tables = ctx
        .warehouse
        .list_tables(&dataset)
        .await
        .with_context(|| format!("Failed to list tables in {}", dataset))?;

    match args.output {
        OutputFormat::Json => print_json(&tables),
        OutputFormat::Text => {
            if tables.is_empty() {
                println!("{} does not contain any tables.", dataset);
            } else {
                println!("Tables in {}:\n", dataset);
                print_tables(&tables, "");
            }
            Ok(())
        }
    }
}

async fn describe(args: &DescribeArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let datasets = match &args.dataset {
        Some(name) => vec![ctx.dataset(name)?],
        None => ctx
            .warehouse
            .list_datasets(None)
            .await
            .with_context(|| format!("Failed to list datasets in {}", ctx.project_label()))?,
    };

    let mut described = Vec::with_capacity(datasets.len());
    for dataset in &datasets {
        let info = ctx
            .warehouse
            .describe_dataset(dataset)
            .await
            .with_context(|| format!("Failed to describe {}", dataset))?;
        described.push(info);
    }

    match args.output {
        OutputFormat::Json => print_json(&described),
        OutputFormat::Text => {
            for (i, info) in described.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print_description(info);
            }
            Ok(())
        }
    }
}

async fn create(args: &CreateArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let dataset = ctx.dataset(&args.dataset)?;
    let location = args.location.as_deref().unwrap_or(&ctx.config.location);

    if ctx
        .warehouse
        .dataset_exists(&dataset)
        .await
        .with_context(|| format!("Failed to check dataset {}", dataset))?
    {
        println!("Dataset {} already exists.", dataset);
        return Ok(());
    }

    ctx.warehouse
        .create_dataset(&dataset, location)
        .await
        .with_context(|| format!("Failed to create dataset {}", dataset))?;
    println!("Created dataset {} in location {}", dataset, location);
    Ok(())
}

async fn delete(args: &DeleteArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let dataset = ctx.dataset(&args.dataset)?;

    if !args.yes {
        bail!(
            "Deleting {} removes every table and view in it. Re-run with --yes to confirm.",
            dataset
        );
    }

    ctx.warehouse
        .delete_dataset(&dataset)
        .await
        .with_context(|| format!("Failed to delete dataset {}", dataset))?;
    println!("Deleted dataset {}", dataset);
    Ok(())
}

fn print_tables(tables: &[TableInfo], indent: &str) {
    let kinds: Vec<String> = tables.iter().map(|t| t.kind.to_string()).collect();
    let name_width = column_width("NAME", tables.iter().map(|t| t.name.as_str()));
    let kind_width = column_width("TYPE", kinds.iter().map(String::as_str));

    println!(
        "{indent}{:<name_width$}  {:<kind_width$}",
        "NAME",
        "TYPE",
        name_width = name_width,
        kind_width = kind_width
    );
    println!(
        "{indent}{:-<name_width$}  {:-<kind_width$}",
        "",
        "",
        name_width = name_width,
        kind_width = kind_width
    );
    for (table, kind) in tables.iter().zip(&kinds) {
        println!(
            "{indent}{:<name_width$}  {:<kind_width$}",
            table.name.as_str(),
            kind,
            name_width = name_width,
            kind_width = kind_width
        );
    }
}

fn print_description(info: &DatasetInfo) {
    println!("Dataset: {}", info.dataset);
    println!("  Location:    {}", info.location.as_deref().unwrap_or("-"));
    println!("  Description: {}", info.description.as_deref().unwrap_or("-"));
    if info.labels.is_empty() {
        println!("  Labels:      -");
    } else {
        let labels: Vec<String> = info
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!("  Labels:      {}", labels.join(", "));
    }
    println!("  Tables ({}):", info.tables.len());
    if !info.tables.is_empty() {
        print_tables(&info.tables, "    ");
    }
}
