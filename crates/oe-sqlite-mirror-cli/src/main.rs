//! oe-sqlite-mirror CLI - mirrors OpenEdge tables into a local SQLite file.

use clap::Parser;
use oe_sqlite_mirror::{Config, MirrorError, Orchestrator};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "oe-sqlite-mirror")]
#[command(about = "Mirror OpenEdge tables into a local SQLite database")]
#[command(version)]
struct Cli {
    /// Perform a full sync of all tables
    #[arg(long = "full-sync")]
    full_sync: bool,

    /// Table to ignore; appended to the ignore file (can be used multiple times)
    #[arg(long = "ignore-table", value_name = "TABLE")]
    ignore_tables: Vec<String>,

    /// Path to JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON summary to stdout
    #[arg(long)]
    output_json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), MirrorError> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    setup_logging(&cli.verbosity, &config.mirror_settings.log_file)
        .map_err(MirrorError::Config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let orchestrator = Orchestrator::new(config, cli.full_sync, &cli.ignore_tables)?;
    let summary = orchestrator.connect_and_run()?;

    if cli.output_json {
        println!("{}", summary.to_json()?);
    } else {
        println!("\nSync completed!");
        println!("  Duration: {:.2}s", summary.duration_seconds);
        println!(
            "  Tables: {}/{}",
            summary.tables_synced, summary.tables_total
        );
        println!("  Rows: {}", summary.rows_synced);
        if !summary.failed_tables.is_empty() {
            println!("  Failed tables: {:?}", summary.failed_tables);
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, log_file: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| format!("Failed to open log file {}: {}", log_file, e))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .init();

    Ok(())
}
