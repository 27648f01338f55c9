// ABOUTME: CLI entry point for clickhouse-replicator
// ABOUTME: Initializes logging, connects source and sink, and runs the sync loop until Ctrl+C

use anyhow::Context;
use clap::Parser;
use clickhouse_replicator::config::{SinkArgs, SourceArgs, SyncArgs};
use clickhouse_replicator::sink::ClickHouseSink;
use clickhouse_replicator::source::PostgresSource;
use clickhouse_replicator::sync::SyncOrchestrator;
use clickhouse_replicator::transform::select_tables;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clickhouse-replicator")]
#[command(about = "Incremental PostgreSQL-to-ClickHouse replication", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    /// Also write logs to this file
    #[arg(long = "log-file", env = "LOG_FILE")]
    log_file: Option<PathBuf>,
    /// Run a single sync cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    sink: SinkArgs,
    #[command(flatten)]
    sync: SyncArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, cli.log_file.as_ref())?;

    let source_config = cli.source.into_config()?;
    let sink_config = cli.sink.into_config()?;
    let settings = cli.sync.into_settings()?;
    let tables = select_tables(&settings.tables)?;

    tracing::info!(
        "Replicating {} -> {} ({})",
        source_config.display_target(),
        sink_config.endpoint(),
        tables.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
    );

    let source = PostgresSource::connect_with_retry(source_config, settings.connect_retries)
        .await
        .context("Failed to connect to source database")?;
    let sink = ClickHouseSink::connect_with_retry(sink_config, settings.connect_retries)
        .await
        .context("Failed to connect to ClickHouse")?;

    let mut orchestrator =
        SyncOrchestrator::new(Box::new(source), Box::new(sink), tables, &settings);

    if cli.once {
        let stats = orchestrator.run_once_and_close().await?;
        if !stats.is_success() {
            anyhow::bail!(
                "{} of {} tables failed to sync",
                stats.tables_failed,
                stats.tables_failed + stats.tables_synced
            );
        }
        return Ok(());
    }

    tracing::info!("Press Ctrl+C to stop");

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx_clone.send(());
    });

    orchestrator.run(shutdown_rx).await?;
    drop(shutdown_tx);

    tracing::info!("Replicator stopped");
    Ok(())
}

/// RUST_LOG takes precedence over --log. With --log-file a second, non-ANSI
/// layer mirrors every event into that file.
fn init_logging(level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}
