// ABOUTME: users table - exchange accounts, synced incrementally on updated_at

use chrono::NaiveDateTime;

use super::{amount, flag, id, non_empty_text_or, text_or, timestamp, UNKNOWN_COUNTRY};
use crate::sink::{SinkRow, SinkValue};
use crate::source::SourceRecord;
use crate::sync::descriptor::TableDescriptor;

pub const TABLE: &str = "users";

pub const COLUMNS: &[&str] = &[
    "user_id",
    "username",
    "email",
    "full_name",
    "country_code",
    "kyc_level",
    "is_verified",
    "risk_score",
    "registration_date",
    "last_login",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub country_code: String,
    pub kyc_level: i64,
    pub is_verified: u8,
    pub risk_score: f64,
    pub registration_date: Option<NaiveDateTime>,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl UserRow {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            user_id: id(record, "user_id"),
            username: text_or(record, "username", ""),
            email: text_or(record, "email", ""),
            full_name: non_empty_text_or(record, "full_name", ""),
            country_code: non_empty_text_or(record, "country_code", UNKNOWN_COUNTRY),
            kyc_level: id(record, "kyc_level"),
            is_verified: flag(record, "is_verified"),
            risk_score: amount(record, "risk_score"),
            registration_date: timestamp(record, "registration_date"),
            last_login: timestamp(record, "last_login"),
            created_at: timestamp(record, "created_at"),
            updated_at: timestamp(record, "updated_at"),
        }
    }
}

impl From<UserRow> for SinkRow {
    fn from(row: UserRow) -> Self {
        SinkRow::new(vec![
            SinkValue::Int(row.user_id),
            SinkValue::Text(row.username),
            SinkValue::Text(row.email),
            SinkValue::Text(row.full_name),
            SinkValue::Text(row.country_code),
            SinkValue::Int(row.kyc_level),
            SinkValue::Flag(row.is_verified),
            SinkValue::Float(row.risk_score),
            row.registration_date.into(),
            row.last_login.into(),
            row.created_at.into(),
            row.updated_at.into(),
        ])
    }
}

pub fn transform(record: &SourceRecord) -> SinkRow {
    UserRow::from_record(record).into()
}

pub fn descriptor() -> TableDescriptor {
    TableDescriptor::incremental(TABLE, "updated_at", COLUMNS, transform)
}
