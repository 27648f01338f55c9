// ABOUTME: TableSyncer - one fetch, transform, load pass for a single table
// ABOUTME: Advances the table's watermark only after the sink accepts the batch

use anyhow::{bail, Error};
use std::fmt;
use std::time::{Duration, Instant};

use super::descriptor::TableDescriptor;
use super::watermark::{Watermark, WatermarkStore};
use crate::sink::{SinkConnector, SinkRow};
use crate::source::{FetchRequest, SourceConnector, SourceRecord};
use crate::utils::with_timeout;

/// Stage of a table sync that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Fetch,
    Transform,
    Load,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            SyncStage::Fetch => "fetch",
            SyncStage::Transform => "transform",
            SyncStage::Load => "load",
        };
        f.write_str(stage)
    }
}

/// Result of one `run_once` call.
#[derive(Debug)]
pub struct SyncOutcome {
    pub table: String,
    pub rows_synced: usize,
    /// Watermark after this pass; `None` if it was not advanced
    pub new_watermark: Option<Watermark>,
    pub error: Option<Error>,
    pub failed_stage: Option<SyncStage>,
    pub duration: Duration,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct StageFailure {
    stage: SyncStage,
    error: Error,
}

impl StageFailure {
    fn at(stage: SyncStage) -> impl FnOnce(Error) -> Self {
        move |error| Self { stage, error }
    }
}

/// Executes the per-table replication pass.
///
/// Stateless apart from its limits: watermarks and connectors are lent in by
/// the caller for each call.
#[derive(Debug, Clone)]
pub struct TableSyncer {
    batch_size: usize,
    call_timeout: Duration,
}

impl TableSyncer {
    pub fn new(batch_size: usize, call_timeout: Duration) -> Self {
        Self {
            batch_size,
            call_timeout,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Replicate at most one batch of `descriptor`'s table.
    ///
    /// Never returns an error: failures are logged and reported in the outcome,
    /// with the watermark left where it was.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - Table name, ordering columns, fetch mode and transform
    /// * `source` - Connector the batch is read from
    /// * `sink` - Connector the transformed batch is loaded into
    /// * `watermarks` - Advanced for this table only after a successful load
    ///
    /// # Returns
    ///
    /// A `SyncOutcome` with the rows loaded, the watermark in effect afterwards
    /// and, on failure, the error and the stage that produced it.
    pub async fn run_once(
        &self,
        descriptor: &TableDescriptor,
        source: &mut dyn SourceConnector,
        sink: &mut dyn SinkConnector,
        watermarks: &mut WatermarkStore,
    ) -> SyncOutcome {
        let start = Instant::now();
        let result = self.sync_batch(descriptor, source, sink, watermarks).await;
        let duration = start.elapsed();

        match result {
            Ok((rows_synced, new_watermark)) => {
                if rows_synced == 0 {
                    tracing::debug!("No new rows in {}", descriptor.name);
                } else {
                    match new_watermark {
                        Some(mark) => tracing::info!(
                            "Synced {} rows from {} in {}ms (watermark {})",
                            rows_synced,
                            descriptor.name,
                            duration.as_millis(),
                            mark
                        ),
                        None => tracing::info!(
                            "Synced {} rows from {} in {}ms",
                            rows_synced,
                            descriptor.name,
                            duration.as_millis()
                        ),
                    }
                }
                SyncOutcome {
                    table: descriptor.name.to_string(),
                    rows_synced,
                    new_watermark,
                    error: None,
                    failed_stage: None,
                    duration,
                }
            }
            Err(failure) => {
                // {:?} prints the whole context chain down to the driver error
                tracing::error!(
                    "Failed to sync {} during {}: {:?}",
                    descriptor.name,
                    failure.stage,
                    failure.error
                );
                SyncOutcome {
                    table: descriptor.name.to_string(),
                    rows_synced: 0,
                    new_watermark: None,
                    error: Some(failure.error),
                    failed_stage: Some(failure.stage),
                    duration,
                }
            }
        }
    }

    async fn sync_batch(
        &self,
        descriptor: &TableDescriptor,
        source: &mut dyn SourceConnector,
        sink: &mut dyn SinkConnector,
        watermarks: &mut WatermarkStore,
    ) -> std::result::Result<(usize, Option<Watermark>), StageFailure> {
        let current = if descriptor.uses_watermark() {
            watermarks.get(descriptor.name)
        } else {
            None
        };

        let request = FetchRequest {
            table: descriptor.name,
            ordering_column: descriptor.ordering_column,
            creation_column: descriptor.creation_column,
            after: current,
            limit: self.batch_size,
        };

        let records = with_timeout(
            self.call_timeout,
            &format!("Fetch from {}", descriptor.name),
            source.fetch(&request),
        )
        .await
        .map_err(StageFailure::at(SyncStage::Fetch))?;

        if records.is_empty() {
            return Ok((0, None));
        }

        tracing::debug!(
            "Fetched {} rows from {} ordered by {} after {}",
            records.len(),
            descriptor.name,
            request.order_by(),
            current.map_or_else(|| "start".to_string(), |w| w.to_string())
        );

        let rows = transform_batch(descriptor, &records)
            .map_err(StageFailure::at(SyncStage::Transform))?;

        with_timeout(
            self.call_timeout,
            &format!("Load into {}", descriptor.name),
            sink.bulk_insert(descriptor.name, descriptor.columns, &rows),
        )
        .await
        .map_err(StageFailure::at(SyncStage::Load))?;

        if !descriptor.uses_watermark() {
            return Ok((rows.len(), None));
        }

        let new_watermark = match max_position(&records, descriptor.ordering_column) {
            Some(candidate) if current.map_or(true, |c| candidate > c) => {
                watermarks.advance(descriptor.name, candidate);
                Some(candidate)
            }
            Some(_) => None,
            None => {
                tracing::warn!(
                    "No {} values in batch from {}; watermark left unchanged",
                    descriptor.ordering_column,
                    descriptor.name
                );
                None
            }
        };

        Ok((rows.len(), new_watermark))
    }
}

/// Apply the table's transform to every record, checking each row's width
/// against the declared column list.
pub fn transform_batch(
    descriptor: &TableDescriptor,
    records: &[SourceRecord],
) -> anyhow::Result<Vec<SinkRow>> {
    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let row = (descriptor.transform)(record);
        if row.len() != descriptor.columns.len() {
            bail!(
                "Row {} of {} has {} values but {} columns are declared",
                index,
                descriptor.name,
                row.len(),
                descriptor.columns.len()
            );
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Largest non-null `column` timestamp among `records`.
pub fn max_position(records: &[SourceRecord], column: &str) -> Option<Watermark> {
    records
        .iter()
        .filter_map(|record| record.get(column).as_timestamp())
        .max()
        .map(Watermark::new)
}
