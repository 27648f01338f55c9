// ABOUTME: Library root for clickhouse-replicator
// ABOUTME: Incremental PostgreSQL to ClickHouse replication engine

pub mod config;
pub mod sink;
pub mod source;
pub mod sync;
pub mod transform;
pub mod utils;
