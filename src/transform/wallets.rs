// ABOUTME: wallets table - per-user currency wallets, synced incrementally on updated_at

use chrono::NaiveDateTime;

use super::{amount, flag, id, non_empty_text_or, text_or, timestamp};
use crate::sink::{SinkRow, SinkValue};
use crate::source::SourceRecord;
use crate::sync::descriptor::TableDescriptor;

pub const TABLE: &str = "wallets";

pub const COLUMNS: &[&str] = &[
    "wallet_id",
    "user_id",
    "wallet_address",
    "wallet_type",
    "currency",
    "balance",
    "is_active",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, PartialEq)]
pub struct WalletRow {
    pub wallet_id: i64,
    pub user_id: i64,
    pub wallet_address: String,
    pub wallet_type: String,
    pub currency: String,
    pub balance: f64,
    pub is_active: u8,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl WalletRow {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            wallet_id: id(record, "wallet_id"),
            user_id: id(record, "user_id"),
            wallet_address: text_or(record, "wallet_address", ""),
            wallet_type: non_empty_text_or(record, "wallet_type", "unknown"),
            currency: text_or(record, "currency", ""),
            balance: amount(record, "balance"),
            is_active: flag(record, "is_active"),
            created_at: timestamp(record, "created_at"),
            updated_at: timestamp(record, "updated_at"),
        }
    }
}

impl From<WalletRow> for SinkRow {
    fn from(row: WalletRow) -> Self {
        SinkRow::new(vec![
            SinkValue::Int(row.wallet_id),
            SinkValue::Int(row.user_id),
            SinkValue::Text(row.wallet_address),
            SinkValue::Text(row.wallet_type),
            SinkValue::Text(row.currency),
            SinkValue::Float(row.balance),
            SinkValue::Flag(row.is_active),
            row.created_at.into(),
            row.updated_at.into(),
        ])
    }
}

pub fn transform(record: &SourceRecord) -> SinkRow {
    WalletRow::from_record(record).into()
}

pub fn descriptor() -> TableDescriptor {
    TableDescriptor::incremental(TABLE, "updated_at", COLUMNS, transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let row = WalletRow::from_record(&SourceRecord::new().with("wallet_id", 3i64));
        assert_eq!(row.wallet_id, 3);
        assert_eq!(row.user_id, 0);
        assert_eq!(row.wallet_type, "unknown");
        assert_eq!(row.balance, 0.0);
        assert_eq!(row.is_active, 0);
    }

    #[test]
    fn test_active_wallet() {
        let record = SourceRecord::new()
            .with("wallet_id", 9i64)
            .with("user_id", 4i64)
            .with("wallet_address", "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh")
            .with("wallet_type", "hot")
            .with("currency", "BTC")
            .with("balance", 0.25f64)
            .with("is_active", true);

        let row = transform(&record);
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row.get(3), Some(&SinkValue::Text("hot".into())));
        assert_eq!(row.get(5), Some(&SinkValue::Float(0.25)));
        assert_eq!(row.get(6), Some(&SinkValue::Flag(1)));
    }
}
