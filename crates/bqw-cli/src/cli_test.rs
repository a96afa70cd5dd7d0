use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn test_parse_chain() {
    let cli = Cli::try_parse_from([
        "bqwizard",
        "dataset",
        "chain",
        "raw",
        "staging",
        "mart",
        "--force",
        "--tables-csv",
        "tables.csv",
    ])
    .unwrap();

    let Commands::Dataset(DatasetCommands::Chain(args)) = cli.command else {
        panic!("expected dataset chain");
    };
    assert_eq!(args.datasets, vec!["raw", "staging", "mart"]);
    assert!(args.force);
    assert_eq!(args.tables_csv, Some(PathBuf::from("tables.csv")));
    assert_eq!(args.output, OutputFormat::Text);
}

#[test]
fn test_chain_needs_two_datasets() {
    let result = Cli::try_parse_from(["bqwizard", "dataset", "chain", "raw"]);
    assert!(result.is_err());
}

#[test]
fn test_global_args_after_subcommand() {
    let cli = Cli::try_parse_from([
        "bqwizard",
        "dataset",
        "ls",
        "--backend",
        "duckdb",
        "--database",
        "local.duckdb",
        "-v",
        "-o",
        "json",
    ])
    .unwrap();

    assert_eq!(cli.global.backend, Some(BackendArg::DuckDb));
    assert_eq!(cli.global.database.as_deref(), Some("local.duckdb"));
    assert!(cli.global.verbose);
    let Commands::Dataset(DatasetCommands::Ls(args)) = cli.command else {
        panic!("expected dataset ls");
    };
    assert_eq!(args.output, OutputFormat::Json);
}

#[test]
fn test_config_set_project() {
    let cli = Cli::try_parse_from(["bqwizard", "config", "set-project", "acme-prod"]).unwrap();
    let Commands::Config(ConfigCommands::SetProject(args)) = cli.command else {
        panic!("expected config set-project");
    };
    assert_eq!(args.project_id, "acme-prod");
}

#[test]
fn test_describe_without_dataset() {
    let cli = Cli::try_parse_from(["bqwizard", "dataset", "describe"]).unwrap();
    let Commands::Dataset(DatasetCommands::Describe(args)) = cli.command else {
        panic!("expected dataset describe");
    };
    assert!(args.dataset.is_none());
}

#[test]
fn test_ls_project_positional() {
    let cli = Cli::try_parse_from(["bqwizard", "dataset", "ls", "other-project"]).unwrap();
    let Commands::Dataset(DatasetCommands::Ls(args)) = cli.command else {
        panic!("expected dataset ls");
    };
    assert_eq!(args.in_project.as_deref(), Some("other-project"));
}
