// ABOUTME: SyncOrchestrator - runs every table sync once per interval until shutdown
// ABOUTME: Owns the connectors and watermark store; one table failure never stops a cycle

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::descriptor::TableDescriptor;
use super::syncer::TableSyncer;
use super::watermark::WatermarkStore;
use crate::config::SyncSettings;
use crate::sink::SinkConnector;
use crate::source::SourceConnector;

/// Statistics from one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub tables_synced: usize,
    pub tables_failed: usize,
    pub rows_synced: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CycleStats {
    /// Check if every table in the cycle completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives periodic replication of the registered tables.
///
/// Tables are synced sequentially in registration order, so the watermark
/// store and both connectors are only ever touched by one table at a time.
pub struct SyncOrchestrator {
    source: Box<dyn SourceConnector>,
    sink: Box<dyn SinkConnector>,
    tables: Vec<TableDescriptor>,
    watermarks: WatermarkStore,
    syncer: TableSyncer,
    interval: Duration,
    cycles: u64,
}

impl SyncOrchestrator {
    pub fn new(
        source: Box<dyn SourceConnector>,
        sink: Box<dyn SinkConnector>,
        tables: Vec<TableDescriptor>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            source,
            sink,
            tables,
            watermarks: WatermarkStore::new(),
            syncer: TableSyncer::new(settings.batch_size, settings.call_timeout),
            interval: settings.interval,
            cycles: 0,
        }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Sync every table once, in order.
    pub async fn run_cycle(&mut self) -> CycleStats {
        let start = Instant::now();
        let mut stats = CycleStats::default();
        self.cycles += 1;

        for descriptor in &self.tables {
            let outcome = self
                .syncer
                .run_once(
                    descriptor,
                    self.source.as_mut(),
                    self.sink.as_mut(),
                    &mut self.watermarks,
                )
                .await;

            match outcome.error {
                None => {
                    stats.tables_synced += 1;
                    stats.rows_synced += outcome.rows_synced as u64;
                }
                Some(e) => {
                    stats.tables_failed += 1;
                    let stage = outcome
                        .failed_stage
                        .map_or_else(|| "sync".to_string(), |s| s.to_string());
                    stats
                        .errors
                        .push(format!("Failed to {} {}: {}", stage, outcome.table, e));
                }
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        stats
    }

    /// Run cycles until `shutdown` fires, then close both connectors.
    ///
    /// The signal interrupts either the inter-cycle sleep or an in-flight
    /// cycle. An interrupted cycle has not advanced the watermark of the table
    /// it was working on, so that table's batch is simply fetched again on the
    /// next start.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        tracing::info!(
            "Starting sync loop: {} tables every {:?} (batch size {}, source {}, sink {})",
            self.tables.len(),
            self.interval,
            self.syncer.batch_size(),
            self.source.name(),
            self.sink.name()
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received during sync cycle, aborting");
                    break;
                }
                stats = self.run_cycle() => {
                    log_cycle(self.cycles, &stats);
                }
            }

            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping sync loop");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.close().await
    }

    /// Run a single cycle, then close both connectors.
    pub async fn run_once_and_close(&mut self) -> Result<CycleStats> {
        let stats = self.run_cycle().await;
        log_cycle(self.cycles, &stats);
        self.close().await?;
        Ok(stats)
    }

    /// Close the source and sink. Both are attempted even if the first fails.
    pub async fn close(&mut self) -> Result<()> {
        let source_result = self.source.close().await;
        let sink_result = self.sink.close().await;

        source_result.with_context(|| format!("Failed to close {}", self.source.name()))?;
        sink_result.with_context(|| format!("Failed to close {}", self.sink.name()))?;

        tracing::info!("Closed source and sink connections");
        Ok(())
    }
}

fn log_cycle(cycle: u64, stats: &CycleStats) {
    tracing::info!(
        "Sync cycle {} completed: {} tables, {} rows in {}ms",
        cycle,
        stats.tables_synced,
        stats.rows_synced,
        stats.duration_ms
    );
    if !stats.is_success() {
        tracing::warn!(
            "Sync cycle {} had {} failed tables: {}",
            cycle,
            stats.tables_failed,
            stats.errors.join("; ")
        );
    }
}
