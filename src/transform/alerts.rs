// ABOUTME: alerts table - fraud/risk alerts raised on transactions, synced on created_at

use chrono::NaiveDateTime;

use super::{id, non_empty_text_or, text_or, timestamp};
use crate::sink::{SinkRow, SinkValue};
use crate::source::SourceRecord;
use crate::sync::descriptor::TableDescriptor;

pub const TABLE: &str = "alerts";

pub const COLUMNS: &[&str] = &[
    "alert_id",
    "transaction_id",
    "user_id",
    "alert_type",
    "severity",
    "description",
    "status",
    "assigned_to",
    "created_at",
    "resolved_at",
];

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRow {
    pub alert_id: i64,
    pub transaction_id: i64,
    pub user_id: i64,
    pub alert_type: String,
    pub severity: String,
    pub description: String,
    pub status: String,
    pub assigned_to: String,
    pub created_at: Option<NaiveDateTime>,
    pub resolved_at: Option<NaiveDateTime>,
}

impl AlertRow {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            alert_id: id(record, "alert_id"),
            transaction_id: id(record, "transaction_id"),
            user_id: id(record, "user_id"),
            alert_type: non_empty_text_or(record, "alert_type", "unknown"),
            severity: non_empty_text_or(record, "severity", "low"),
            description: non_empty_text_or(record, "description", ""),
            status: non_empty_text_or(record, "status", "pending"),
            assigned_to: text_or(record, "assigned_to", ""),
            created_at: timestamp(record, "created_at"),
            resolved_at: timestamp(record, "resolved_at"),
        }
    }
}

impl From<AlertRow> for SinkRow {
    fn from(row: AlertRow) -> Self {
        SinkRow::new(vec![
            SinkValue::Int(row.alert_id),
            SinkValue::Int(row.transaction_id),
            SinkValue::Int(row.user_id),
            SinkValue::Text(row.alert_type),
            SinkValue::Text(row.severity),
            SinkValue::Text(row.description),
            SinkValue::Text(row.status),
            SinkValue::Text(row.assigned_to),
            row.created_at.into(),
            row.resolved_at.into(),
        ])
    }
}

pub fn transform(record: &SourceRecord) -> SinkRow {
    AlertRow::from_record(record).into()
}

/// Alerts are immutable once raised, so creation time doubles as the ordering column.
pub fn descriptor() -> TableDescriptor {
    TableDescriptor::incremental(TABLE, "created_at", COLUMNS, transform)
}
