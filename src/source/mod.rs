// ABOUTME: Source connector abstraction - ordered range scans over source tables
// ABOUTME: Defines the raw value model and SourceRecord returned by every source

pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::sync::watermark::Watermark;

pub use postgres::PostgresSource;

/// A raw column value as stored by the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    Timestamp(NaiveDateTime),
    Inet(IpAddr),
    Uuid(uuid::Uuid),
}

static NULL: Value = Value::Null;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value. Decimals and floats are truncated, booleans become 0/1.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Numeric(d) => d.trunc().to_i64(),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Int(v) => Some(*v as f64),
            Value::Numeric(d) => d.to_f64(),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Boolean view of the value. Any non-zero number counts as true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(v) => Some(*v != 0),
            Value::Numeric(d) => Some(!d.is_zero()),
            Value::Float(f) if !f.is_nan() => Some(*f != 0.0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "yes" | "y" => Some(true),
                "f" | "false" | "0" | "no" | "n" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Textual view of the value. Only text-like source types qualify.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Uuid(u) => Some(u.to_string()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Value::Inet(ip) => Some(*ip),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Numeric(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Self {
        Value::Inet(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One source row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    values: HashMap<String, Value>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for constructing records by hand.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    /// Value of `column`, or `Value::Null` if the record has no such column.
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for SourceRecord {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Parameters for one incremental fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub table: &'a str,
    /// Column compared against `after` and used for ordering when a watermark exists
    pub ordering_column: &'a str,
    /// Natural creation order, used when no watermark exists yet
    pub creation_column: &'a str,
    pub after: Option<Watermark>,
    pub limit: usize,
}

impl FetchRequest<'_> {
    /// Column the result set is ordered by for this request.
    pub fn order_by(&self) -> &str {
        if self.after.is_some() {
            self.ordering_column
        } else {
            self.creation_column
        }
    }
}

/// Read-only access to the transactional store being replicated.
///
/// `fetch` returns records ordered ascending:
/// - with `after` absent, the oldest `limit` records by `creation_column`;
/// - with `after` present, records whose `ordering_column` is strictly greater
///   than `after`, capped at `limit`.
///
/// A failed fetch returns an error and no records.
#[async_trait]
pub trait SourceConnector: Send {
    async fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<Vec<SourceRecord>>;

    /// Release the underlying connection.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}
