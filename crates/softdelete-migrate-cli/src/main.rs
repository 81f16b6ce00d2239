//! softdelete-migrate CLI - move soft-deleted rows into archive tables.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use softdelete_migrate::{drivers, Config, DbConnection, MigrateError, Orchestrator};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "softdelete-migrate")]
#[command(about = "Move soft-deleted rows into archive tables (MySQL and SQLite)")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

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
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive soft-deleted rows
    Run {
        /// Generate statements and audit scripts without writing
        #[arg(long)]
        dry_run: bool,

        /// Override the source table
        #[arg(long)]
        table: Option<String>,

        /// Override the maximum number of rows to move
        #[arg(long)]
        limit: Option<u64>,

        /// Override the number of rows per batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Show the discovered key, columns and archive table state
    Inspect,

    /// Test database connections
    HealthCheck,
}

/// Connectivity of one configured connection.
#[derive(Debug, Serialize)]
struct ConnectionHealth {
    role: &'static str,
    name: String,
    connected: bool,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            dry_run,
            table,
            limit,
            batch_size,
        } => {
            // Apply overrides
            if dry_run {
                config.migration.dry_run = Some(true);
            }
            if table.is_some() {
                config.migration.table = table;
            }
            if limit.is_some() {
                config.migration.limit = limit;
            }
            if batch_size.is_some() {
                config.migration.batch_size = batch_size;
            }

            let migration = config.migration.resolve()?;
            let (source, archive) = open_connections(&config).await?;
            let mut orchestrator = Orchestrator::new(migration, source);
            if let Some(archive) = archive {
                orchestrator = orchestrator.with_archive(archive);
            }

            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if result.dry_run {
                    "Dry run completed!"
                } else {
                    "Migration completed!"
                };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Source: {}", result.source_table);
                println!("  Archive: {}", result.archive_table);
                println!("  Rows selected: {}", result.rows_selected);
                println!("  Batches: {}", result.batches);
                println!("  Rows archived: {}", result.rows_archived);
                println!("  Rows deleted: {}", result.rows_deleted);
                if let Some(ref err) = result.audit_error {
                    println!("  Audit scripts not written: {}", err);
                }
                let failed: Vec<_> = result.failed_batches().collect();
                if !failed.is_empty() {
                    println!("  Failed batches:");
                    for report in failed {
                        println!(
                            "    {} batch {}: {}",
                            report.kind,
                            report.batch_index,
                            report.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }
        }

        Commands::Inspect => {
            let migration = config.migration.resolve()?;
            let (source, archive) = open_connections(&config).await?;
            let mut orchestrator = Orchestrator::new(migration, source);
            if let Some(archive) = archive {
                orchestrator = orchestrator.with_archive(archive);
            }
            let inspection = orchestrator.inspect().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&inspection)?);
            } else {
                println!("Source table: {}", inspection.source.full_name());
                println!(
                    "  Primary key: {}",
                    inspection.source.primary_key.columns().join(", ")
                );
                println!("  Columns:");
                for column in &inspection.source.columns {
                    println!(
                        "    {} {}{}",
                        column.name,
                        column.data_type,
                        if column.is_nullable { "" } else { " NOT NULL" }
                    );
                }
                println!(
                    "Archive table: {}.{} ({})",
                    inspection.archive_schema,
                    inspection.archive_table,
                    if inspection.archive_exists {
                        "exists"
                    } else {
                        "missing"
                    }
                );
                if !inspection.archive_exists {
                    println!("  Would create: {}", inspection.archive_ddl);
                }
            }
        }

        Commands::HealthCheck => {
            let mut results = vec![check_connection("source", &config.source.url).await];
            if let Some(ref archive) = config.archive {
                results.push(check_connection("archive", &archive.url).await);
            }
            let healthy = results.iter().all(|r| r.connected);

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "healthy": healthy,
                        "connections": results,
                    }))?
                );
            } else {
                println!("Health Check Results:");
                for result in &results {
                    println!(
                        "  {} ({}): {} ({}ms)",
                        result.role,
                        result.name,
                        if result.connected { "OK" } else { "FAILED" },
                        result.latency_ms
                    );
                    if let Some(ref err) = result.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

async fn open_connections(
    config: &Config,
) -> Result<(Arc<dyn DbConnection>, Option<Arc<dyn DbConnection>>), MigrateError> {
    let source = drivers::connect(&config.source.url).await?;
    let archive = match config.archive {
        Some(ref archive) => Some(drivers::connect(&archive.url).await?),
        None => None,
    };
    Ok((source, archive))
}

async fn check_connection(role: &'static str, url: &str) -> ConnectionHealth {
    let start = Instant::now();
    let outcome = async {
        let conn = drivers::connect(url).await?;
        conn.query("SELECT 1", &[]).await?;
        conn.close().await?;
        Ok::<(), MigrateError>(())
    }
    .await;

    ConnectionHealth {
        role,
        name: drivers::redact_url(url),
        connected: outcome.is_ok(),
        latency_ms: start.elapsed().as_millis() as u64,
        error: outcome.err().map(|e| e.to_string()),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
