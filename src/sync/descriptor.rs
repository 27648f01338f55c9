// ABOUTME: TableDescriptor - static per-table sync configuration
// ABOUTME: Names the ordering column, fetch mode, sink columns and transform for one table

use crate::sink::SinkRow;
use crate::source::SourceRecord;

/// Maps one source record to one sink row. Must be total.
pub type TransformFn = fn(&SourceRecord) -> SinkRow;

/// Column giving the natural creation order of every replicated table.
pub const CREATION_COLUMN: &str = "created_at";

/// How a table's rows are selected each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Fetch rows past the table's watermark, then advance it
    Incremental,
    /// Append-only table: always fetch from the oldest row (bounded by the
    /// batch size) and never keep a watermark
    FullScan,
}

/// Static configuration for one replicated table, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct TableDescriptor {
    pub name: &'static str,
    /// Column compared against the watermark (`updated_at` for mutable tables)
    pub ordering_column: &'static str,
    pub creation_column: &'static str,
    pub mode: FetchMode,
    /// Sink column names, in the positional order of the transform's output
    pub columns: &'static [&'static str],
    pub transform: TransformFn,
}

impl TableDescriptor {
    pub fn incremental(
        name: &'static str,
        ordering_column: &'static str,
        columns: &'static [&'static str],
        transform: TransformFn,
    ) -> Self {
        Self {
            name,
            ordering_column,
            creation_column: CREATION_COLUMN,
            mode: FetchMode::Incremental,
            columns,
            transform,
        }
    }

    pub fn full_scan(
        name: &'static str,
        columns: &'static [&'static str],
        transform: TransformFn,
    ) -> Self {
        Self {
            name,
            ordering_column: CREATION_COLUMN,
            creation_column: CREATION_COLUMN,
            mode: FetchMode::FullScan,
            columns,
            transform,
        }
    }

    pub fn uses_watermark(&self) -> bool {
        self.mode == FetchMode::Incremental
    }
}
