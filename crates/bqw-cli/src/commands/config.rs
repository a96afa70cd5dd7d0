//! Config file commands

use anyhow::{Context, Result};
use bqw_core::{Config, ProjectId};

use crate::cli::{ConfigCommands, GlobalArgs, SetProjectArgs};
use crate::context::{config_path, load_config};

/// Execute a config subcommand
pub async fn execute(command: &ConfigCommands, global: &GlobalArgs) -> Result<()> {
    match command {
        ConfigCommands::Show => show(global),
        ConfigCommands::SetProject(args) => set_project(args, global),
    }
}

fn show(global: &GlobalArgs) -> Result<()> {
    let path = config_path(global)?;
    let config = load_config(global)?;

    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} (not found, showing defaults)", path.display());
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn set_project(args: &SetProjectArgs, global: &GlobalArgs) -> Result<()> {
    let project = ProjectId::try_new(args.project_id.as_str()).context("Invalid project")?;
    let path = config_path(global)?;

    let mut config = Config::load_or_default(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.project = Some(project.to_string());
    config
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Default project set to {} in {}", project, path.display());
    Ok(())
}
