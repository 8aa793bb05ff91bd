//! dbf-path-migrate CLI - Move stored DBF file locations between drives and shares.

use clap::{Args, Parser, Subcommand};
use dbf_path_migrate::{
    local_view, resolve, Config, LocalView, MigrateError, MigrationResult, Orchestrator, Overrides,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "dbf-path-migrate")]
#[command(about = "Rewrite file locations stored in DBF tables for a new drive or network share")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to state file for resume capability
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite the catalog and every entity's tables
    Run {
        /// Report what would change without writing to any table
        #[arg(long)]
        dry_run: bool,

        /// Write the before/after change report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Continue a previous run, skipping tables it completed
    Resume {
        /// Write the before/after change report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Show how stored paths would be rewritten
    Resolve {
        /// Stored paths to map
        #[arg(required = true)]
        paths: Vec<String>,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// List the entities found in the catalog
    ListEntities {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
}

#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Override the installation drive letter
    #[arg(long)]
    drive: Option<String>,

    /// Override the installation subpath (e.g. Compacw\Empresas)
    #[arg(long)]
    base_path: Option<String>,

    /// Local directory holding the catalog and entity directories
    #[arg(long)]
    root: Option<PathBuf>,

    /// Target a local drive letter
    #[arg(long, conflicts_with_all = ["host", "target_base"])]
    target_drive: Option<String>,

    /// Target a network share on this host
    #[arg(long, conflicts_with = "target_base")]
    host: Option<String>,

    /// Share path on the target host
    #[arg(long, requires = "host")]
    share_path: Option<String>,

    /// Explicit target base (drive, UNC root or UNC path)
    #[arg(long)]
    target_base: Option<String>,

    /// Leave the catalog's own path columns untouched
    #[arg(long)]
    skip_catalog: bool,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Overrides {
            drive: args.drive,
            base_path: args.base_path,
            root: args.root,
            target_drive: args.target_drive,
            host: args.host,
            share_path: args.share_path,
            target_base: args.target_base,
            skip_catalog: args.skip_catalog,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let base_config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            dry_run,
            report,
            overrides,
        } => {
            let mut config = base_config;
            config.apply_overrides(&overrides.into())?;
            if report.is_some() {
                config.migration.report_file = report;
            }

            let mut orchestrator = Orchestrator::new(config)?.with_progress(cli.progress);
            if let Some(ref path) = cli.state_file {
                orchestrator = orchestrator.with_state_file(path.clone());
            }

            let result = orchestrator.run(dry_run)?;
            let title = if dry_run {
                "Dry run completed!"
            } else {
                "Migration completed!"
            };
            print_result(&result, title, cli.output_json)?;
        }

        Commands::Resume { report, overrides } => {
            // State file is required for resume
            let state_file = cli.state_file.ok_or_else(|| {
                MigrateError::Config("--state-file is required for resume".to_string())
            })?;
            if !state_file.exists() {
                return Err(MigrateError::Config(format!(
                    "State file not found: {:?}",
                    state_file
                )));
            }

            let mut config = base_config;
            config.apply_overrides(&overrides.into())?;
            if report.is_some() {
                config.migration.report_file = report;
            }

            let orchestrator = Orchestrator::new(config)?
                .with_state_file(state_file)
                .resume()?
                .with_progress(cli.progress);

            info!("Resuming from previous state");
            let result = orchestrator.run(false)?;
            print_result(&result, "Migration resumed and completed!", cli.output_json)?;
        }

        Commands::Resolve { paths, overrides } => {
            let mut config = base_config;
            config.apply_overrides(&overrides.into())?;
            let path_config = config.path_config()?;

            let rows: Vec<_> = paths
                .iter()
                .map(|old| {
                    let local = match local_view(old, &path_config) {
                        LocalView::Root { path, .. } => Some(path),
                        LocalView::Container | LocalView::Unresolvable => None,
                    };
                    (old, resolve(old, &path_config), local)
                })
                .collect();

            if cli.output_json {
                let out: Vec<_> = rows
                    .iter()
                    .map(|(old, new, local)| json!({ "old": old, "new": new, "local": local }))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "target_base": path_config.target_base(),
                        "paths": out,
                    }))?
                );
            } else {
                println!("Target base: {}", path_config.target_base());
                for (old, new, local) in &rows {
                    println!("{}", old);
                    println!("  -> {}", new);
                    if let Some(local) = local {
                        println!("  local: {}", local);
                    }
                }
            }
        }

        Commands::ListEntities { overrides } => {
            let mut config = base_config;
            config.apply_overrides(&overrides.into())?;
            let entities = Orchestrator::new(config)?.list_entities()?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&entities)?);
            } else {
                println!("Entities: {}", entities.len());
                for entity in &entities {
                    println!(
                        "  {} ({}) -> {}",
                        entity.root.name,
                        entity.root.local_path,
                        entity.directory.display()
                    );
                    for table in &entity.tables {
                        println!(
                            "    {} {}",
                            if table.found { "found  " } else { "MISSING" },
                            table.name
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

/// Load the YAML config, or the built-in defaults when no file is given.
fn load_config(path: Option<&PathBuf>) -> Result<Config, MigrateError> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(Config::default());
    };
    let config = Config::load(path)?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

fn print_result(result: &MigrationResult, title: &str, output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", result.to_json()?);
        return Ok(());
    }

    println!("\n{}", title);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  {} -> {}", result.local_root, result.target_base);
    println!(
        "  Entities: {}/{}",
        result.entities_ok, result.entities_total
    );
    println!(
        "  Tables: {}/{} ({} skipped)",
        result.tables_updated, result.tables_total, result.tables_skipped
    );
    println!(
        "  Changes: {} ({} in catalog, {} truncated)",
        result.changes_total, result.catalog_changes, result.overflow_count
    );
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout carries only results.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
