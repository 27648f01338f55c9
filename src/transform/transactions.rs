// ABOUTME: transactions table - on-chain and internal transfers, synced incrementally on updated_at
// ABOUTME: Widest schema; carries the nullable block_number and completed_at columns

use chrono::NaiveDateTime;

use super::{
    amount, flag, id, ip_text, non_empty_text_or, nullable_int, text_or, timestamp,
    UNKNOWN_COUNTRY,
};
use crate::sink::{SinkRow, SinkValue};
use crate::source::SourceRecord;
use crate::sync::descriptor::TableDescriptor;

pub const TABLE: &str = "transactions";

pub const COLUMNS: &[&str] = &[
    "transaction_id",
    "transaction_hash",
    "user_id",
    "from_wallet_id",
    "to_wallet_id",
    "to_address",
    "amount",
    "currency",
    "usd_amount",
    "fee",
    "transaction_type",
    "status",
    "network",
    "confirmations",
    "block_number",
    "risk_score",
    "is_flagged",
    "flag_reason",
    "ip_address",
    "device_id",
    "country_code",
    "created_at",
    "completed_at",
    "updated_at",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    pub transaction_id: i64,
    pub transaction_hash: String,
    pub user_id: i64,
    pub from_wallet_id: i64,
    pub to_wallet_id: i64,
    pub to_address: String,
    pub amount: f64,
    pub currency: String,
    pub usd_amount: f64,
    pub fee: f64,
    pub transaction_type: String,
    pub status: String,
    pub network: String,
    pub confirmations: i64,
    pub block_number: Option<i64>,
    pub risk_score: f64,
    pub is_flagged: u8,
    pub flag_reason: String,
    pub ip_address: String,
    pub device_id: String,
    pub country_code: String,
    pub created_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl TransactionRow {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            transaction_id: id(record, "transaction_id"),
            transaction_hash: text_or(record, "transaction_hash", ""),
            user_id: id(record, "user_id"),
            from_wallet_id: id(record, "from_wallet_id"),
            to_wallet_id: id(record, "to_wallet_id"),
            to_address: non_empty_text_or(record, "to_address", ""),
            amount: amount(record, "amount"),
            currency: text_or(record, "currency", ""),
            usd_amount: amount(record, "usd_amount"),
            fee: amount(record, "fee"),
            transaction_type: non_empty_text_or(record, "transaction_type", "unknown"),
            status: non_empty_text_or(record, "status", "pending"),
            network: non_empty_text_or(record, "network", ""),
            confirmations: id(record, "confirmations"),
            block_number: nullable_int(record, "block_number"),
            risk_score: amount(record, "risk_score"),
            is_flagged: flag(record, "is_flagged"),
            flag_reason: non_empty_text_or(record, "flag_reason", ""),
            ip_address: ip_text(record, "ip_address"),
            device_id: non_empty_text_or(record, "device_id", ""),
            country_code: non_empty_text_or(record, "country_code", UNKNOWN_COUNTRY),
            created_at: timestamp(record, "created_at"),
            completed_at: timestamp(record, "completed_at"),
            updated_at: timestamp(record, "updated_at"),
        }
    }
}

impl From<TransactionRow> for SinkRow {
    fn from(row: TransactionRow) -> Self {
        SinkRow::new(vec![
            SinkValue::Int(row.transaction_id),
            SinkValue::Text(row.transaction_hash),
            SinkValue::Int(row.user_id),
            SinkValue::Int(row.from_wallet_id),
            SinkValue::Int(row.to_wallet_id),
            SinkValue::Text(row.to_address),
            SinkValue::Float(row.amount),
            SinkValue::Text(row.currency),
            SinkValue::Float(row.usd_amount),
            SinkValue::Float(row.fee),
            SinkValue::Text(row.transaction_type),
            SinkValue::Text(row.status),
            SinkValue::Text(row.network),
            SinkValue::Int(row.confirmations),
            row.block_number.into(),
            SinkValue::Float(row.risk_score),
            SinkValue::Flag(row.is_flagged),
            SinkValue::Text(row.flag_reason),
            SinkValue::Text(row.ip_address),
            SinkValue::Text(row.device_id),
            SinkValue::Text(row.country_code),
            row.created_at.into(),
            row.completed_at.into(),
            row.updated_at.into(),
        ])
    }
}

pub fn transform(record: &SourceRecord) -> SinkRow {
    TransactionRow::from_record(record).into()
}

pub fn descriptor() -> TableDescriptor {
    TableDescriptor::incremental(TABLE, "updated_at", COLUMNS, transform)
}
