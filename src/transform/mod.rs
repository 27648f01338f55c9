// ABOUTME: Row transforms - per-table mapping of raw source records to typed sink rows
// ABOUTME: Holds the shared null-default coercions and the registered table list

pub mod alerts;
pub mod merchants;
pub mod transactions;
pub mod users;
pub mod wallets;

use anyhow::{bail, Result};
use chrono::NaiveDateTime;

use crate::source::SourceRecord;
use crate::sync::descriptor::TableDescriptor;

/// Sentinel for an absent IP address.
pub const UNSPECIFIED_IP: &str = "0.0.0.0";
/// Sentinel for an absent country code.
pub const UNKNOWN_COUNTRY: &str = "XX";

// Coercions below are total: a null, missing or wrongly-typed value yields the
// column default instead of an error.

/// Identifier or numeric foreign key; 0 when null.
pub(crate) fn id(record: &SourceRecord, column: &str) -> i64 {
    record.get(column).as_i64().unwrap_or(0)
}

/// Nullable integer passed through as-is (e.g. `block_number`).
pub(crate) fn nullable_int(record: &SourceRecord, column: &str) -> Option<i64> {
    record.get(column).as_i64()
}

/// String column with a table-specific sentinel.
pub(crate) fn text_or(record: &SourceRecord, column: &str, sentinel: &str) -> String {
    record
        .get(column)
        .as_text()
        .unwrap_or_else(|| sentinel.to_string())
}

/// Empty strings fall back to the sentinel as well as nulls.
pub(crate) fn non_empty_text_or(record: &SourceRecord, column: &str, sentinel: &str) -> String {
    record
        .get(column)
        .as_text()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| sentinel.to_string())
}

/// Boolean-like field as 0/1.
pub(crate) fn flag(record: &SourceRecord, column: &str) -> u8 {
    u8::from(record.get(column).as_bool().unwrap_or(false))
}

/// Amount/score field as f64; 0.0 when null.
pub(crate) fn amount(record: &SourceRecord, column: &str) -> f64 {
    record.get(column).as_f64().unwrap_or(0.0)
}

/// IP address rendered as text; `0.0.0.0` when absent.
pub(crate) fn ip_text(record: &SourceRecord, column: &str) -> String {
    record
        .get(column)
        .as_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNSPECIFIED_IP.to_string())
}

/// Timestamp passed through, including null.
pub(crate) fn timestamp(record: &SourceRecord, column: &str) -> Option<NaiveDateTime> {
    record.get(column).as_timestamp()
}

/// Every replicated table, in sync order: referenced tables before the tables
/// that reference them.
pub fn registered_tables() -> Vec<TableDescriptor> {
    vec![
        users::descriptor(),
        wallets::descriptor(),
        merchants::descriptor(),
        transactions::descriptor(),
        alerts::descriptor(),
    ]
}

/// Registered tables narrowed to `names`, keeping registration order.
///
/// An empty selection means every table. Unknown names are an error.
pub fn select_tables(names: &[String]) -> Result<Vec<TableDescriptor>> {
    let all = registered_tables();
    if names.is_empty() {
        return Ok(all);
    }

    for name in names {
        if !all.iter().any(|d| d.name == name.as_str()) {
            let known: Vec<&str> = all.iter().map(|d| d.name).collect();
            bail!(
                "Unknown table '{}'. Registered tables: {}",
                name,
                known.join(", ")
            );
        }
    }

    Ok(all
        .into_iter()
        .filter(|d| names.iter().any(|n| n == d.name))
        .collect())
}
