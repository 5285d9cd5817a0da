//! bugtracker-migrate CLI - copy the bug tracker from SQLite into PostgreSQL.

use clap::{Parser, Subcommand};
use bugtracker_migrate::error::EXIT_VERIFICATION_FAILED;
use bugtracker_migrate::{Config, MigrateError, Orchestrator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Configuration file picked up from the working directory when present.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "bugtracker-migrate")]
#[command(about = "Migrate bug tracker data from SQLite to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: config.yaml, then environment]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy users and bugs into the target and verify row counts (default)
    Run {
        /// Abort and roll back on the first row that cannot be written
        #[arg(long)]
        strict: bool,
    },

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,

    /// Create or upgrade the users and bugs tables on the target
    InitSchema,
}

/// How the process should end.
enum Outcome {
    Success,
    CountMismatch,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::CountMismatch) => ExitCode::from(EXIT_VERIFICATION_FAILED),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<Outcome, MigrateError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = load_config(cli.config.as_deref())?;
    info!(
        "Source: {}, target: {}",
        config.source.describe(),
        config.target.describe()
    );

    let command = cli.command.unwrap_or(Commands::Run { strict: false });

    match command {
        Commands::Run { strict } => {
            let mut orchestrator = Orchestrator::new(config);
            if strict {
                orchestrator = orchestrator.with_strict(true);
            }

            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration {}!", result.status.replace('_', " "));
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                for stats in [&result.users, &result.bugs] {
                    println!(
                        "  {}: {}/{} migrated, {} failed",
                        stats.table, stats.migrated, stats.read, stats.failed
                    );
                    for failure in &stats.failures {
                        println!("    {}: {}", failure.row, failure.error);
                    }
                }
                print_counts(&result.verification);
            }

            if !result.is_success() {
                return Ok(Outcome::CountMismatch);
            }
        }

        Commands::Validate => {
            let report = Orchestrator::new(config).validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_counts(&report);
            }

            if !report.is_complete() {
                return Ok(Outcome::CountMismatch);
            }
            if !cli.output_json {
                println!("Validation completed successfully");
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::new(config).health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                for (role, health) in [("Source", &result.source), ("Target", &result.target)] {
                    println!(
                        "  {}: {} ({}ms)",
                        role,
                        if health.connected { "OK" } else { "FAILED" },
                        health.latency_ms
                    );
                    if let Some(ref version) = health.version {
                        println!("    Version: {}", version);
                    }
                    if health.connected {
                        println!("    Tables: {:?}", health.tables);
                    }
                    if let Some(ref err) = health.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health-check",
                    "one or both stores are unreachable",
                ));
            }
        }

        Commands::InitSchema => {
            let report = Orchestrator::new(config).init_schema().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_unchanged() {
                println!("Schema already up to date");
            } else {
                for table in &report.created_tables {
                    println!("  Created table {}", table);
                }
                for column in &report.added_columns {
                    println!("  Added column {}", column);
                }
            }
        }
    }

    Ok(Outcome::Success)
}

/// Explicit `--config`, then `config.yaml` in the working directory, then the
/// environment.
fn load_config(path: Option<&Path>) -> Result<Config, MigrateError> {
    if let Some(path) = path {
        let config = Config::load(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    let default = Path::new(DEFAULT_CONFIG_FILE);
    if default.exists() {
        let config = Config::load(default)?;
        info!("Loaded configuration from {:?}", default);
        return Ok(config);
    }

    // Variables already set in the process win over `.env`
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {:?}", path);
    }
    info!("No configuration file, reading environment");
    Config::from_env()
}

fn print_counts(report: &bugtracker_migrate::VerificationReport) {
    println!("\nRow counts:");
    for count in &report.tables {
        println!(
            "  {}: source={} target={} {}",
            count.table,
            count.source,
            count.target,
            if count.matches() { "OK" } else { "MISMATCH" }
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}': use text or json", other)),
    }

    Ok(())
}
