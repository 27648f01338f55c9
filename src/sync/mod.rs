// ABOUTME: Incremental sync engine - table descriptors, watermarks, table syncer and orchestrator
// ABOUTME: Moves new and changed rows from a source connector to a sink connector

pub mod descriptor;
pub mod orchestrator;
pub mod syncer;
pub mod watermark;

pub use descriptor::{FetchMode, TableDescriptor, TransformFn};
pub use orchestrator::{CycleStats, SyncOrchestrator};
pub use syncer::{SyncOutcome, SyncStage, TableSyncer};
pub use watermark::{Watermark, WatermarkStore};
