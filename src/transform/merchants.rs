// ABOUTME: merchants table - append-only merchant directory, rescanned every cycle

use chrono::NaiveDateTime;

use super::{flag, id, non_empty_text_or, text_or, timestamp, UNKNOWN_COUNTRY};
use crate::sink::{SinkRow, SinkValue};
use crate::source::SourceRecord;
use crate::sync::descriptor::TableDescriptor;

pub const TABLE: &str = "merchants";

pub const COLUMNS: &[&str] = &[
    "merchant_id",
    "merchant_name",
    "merchant_category",
    "country_code",
    "risk_level",
    "is_active",
    "created_at",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MerchantRow {
    pub merchant_id: i64,
    pub merchant_name: String,
    pub merchant_category: String,
    pub country_code: String,
    pub risk_level: String,
    pub is_active: u8,
    pub created_at: Option<NaiveDateTime>,
}

impl MerchantRow {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            merchant_id: id(record, "merchant_id"),
            merchant_name: text_or(record, "merchant_name", ""),
            merchant_category: non_empty_text_or(record, "merchant_category", ""),
            country_code: non_empty_text_or(record, "country_code", UNKNOWN_COUNTRY),
            risk_level: non_empty_text_or(record, "risk_level", "low"),
            is_active: flag(record, "is_active"),
            created_at: timestamp(record, "created_at"),
        }
    }
}

impl From<MerchantRow> for SinkRow {
    fn from(row: MerchantRow) -> Self {
        SinkRow::new(vec![
            SinkValue::Int(row.merchant_id),
            SinkValue::Text(row.merchant_name),
            SinkValue::Text(row.merchant_category),
            SinkValue::Text(row.country_code),
            SinkValue::Text(row.risk_level),
            SinkValue::Flag(row.is_active),
            row.created_at.into(),
        ])
    }
}

pub fn transform(record: &SourceRecord) -> SinkRow {
    MerchantRow::from_record(record).into()
}

pub fn descriptor() -> TableDescriptor {
    TableDescriptor::full_scan(TABLE, COLUMNS, transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let row = MerchantRow::from_record(&SourceRecord::new());
        assert_eq!(row.merchant_category, "");
        assert_eq!(row.country_code, "XX");
        assert_eq!(row.risk_level, "low");
        assert_eq!(row.is_active, 0);
        assert_eq!(row.created_at, None);
    }

    #[test]
    fn test_full_scan_descriptor() {
        let d = descriptor();
        assert!(!d.uses_watermark());
        assert_eq!(d.columns.len(), 7);
    }
}
