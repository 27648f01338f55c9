// ABOUTME: Sink connector abstraction - atomic bulk inserts into the analytical store
// ABOUTME: Defines SinkValue/SinkRow, the fully-typed rows produced by table transforms

pub mod clickhouse;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::ser::{Serialize, Serializer};

pub use clickhouse::ClickHouseSink;

/// Timestamp layout accepted by ClickHouse `DateTime`/`DateTime64` columns.
pub const SINK_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A typed value ready for bulk insertion.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkValue {
    Int(i64),
    /// 0/1 flag derived from a boolean-like source field
    Flag(u8),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    /// Only emitted for columns the sink declares nullable
    Null,
}

impl SinkValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SinkValue::Null)
    }
}

impl Serialize for SinkValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SinkValue::Int(v) => serializer.serialize_i64(*v),
            SinkValue::Flag(v) => serializer.serialize_u8(*v),
            SinkValue::Float(v) => serializer.serialize_f64(*v),
            SinkValue::Text(v) => serializer.serialize_str(v),
            SinkValue::Timestamp(ts) => {
                serializer.collect_str(&ts.format(SINK_TIMESTAMP_FORMAT))
            }
            SinkValue::Null => serializer.serialize_none(),
        }
    }
}

impl From<i64> for SinkValue {
    fn from(v: i64) -> Self {
        SinkValue::Int(v)
    }
}

impl From<u8> for SinkValue {
    fn from(v: u8) -> Self {
        SinkValue::Flag(v)
    }
}

impl From<f64> for SinkValue {
    fn from(v: f64) -> Self {
        SinkValue::Float(v)
    }
}

impl From<String> for SinkValue {
    fn from(v: String) -> Self {
        SinkValue::Text(v)
    }
}

impl From<&str> for SinkValue {
    fn from(v: &str) -> Self {
        SinkValue::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for SinkValue {
    fn from(v: NaiveDateTime) -> Self {
        SinkValue::Timestamp(v)
    }
}

impl<T: Into<SinkValue>> From<Option<T>> for SinkValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SinkValue::Null)
    }
}

/// One transformed row; values are positional, matching the table's declared columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SinkRow {
    values: Vec<SinkValue>,
}

impl SinkRow {
    pub fn new(values: Vec<SinkValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[SinkValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SinkValue> {
        self.values.get(index)
    }
}

impl FromIterator<SinkValue> for SinkRow {
    fn from_iter<I: IntoIterator<Item = SinkValue>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Bulk-insert capability of the analytical store.
///
/// `bulk_insert` receives an explicit column list and rows whose width equals
/// that list. The whole call is accepted or rejected; no partial commit.
#[async_trait]
pub trait SinkConnector: Send {
    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[SinkRow],
    ) -> Result<()>;

    /// Release the underlying connection.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_sink_value_json() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_micro_opt(8, 30, 0, 250)
            .unwrap();

        assert_eq!(serde_json::to_value(SinkValue::Int(-4)).unwrap(), serde_json::json!(-4));
        assert_eq!(serde_json::to_value(SinkValue::Flag(1)).unwrap(), serde_json::json!(1));
        assert_eq!(serde_json::to_value(SinkValue::Float(0.0)).unwrap(), serde_json::json!(0.0));
        assert_eq!(serde_json::to_value(SinkValue::from("XX")).unwrap(), serde_json::json!("XX"));
        assert_eq!(
            serde_json::to_value(SinkValue::Timestamp(ts)).unwrap(),
            serde_json::json!("2024-05-17 08:30:00.000250")
        );
        assert_eq!(serde_json::to_value(SinkValue::Null).unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_optional_timestamp_becomes_null() {
        assert!(SinkValue::from(None::<NaiveDateTime>).is_null());
        assert!(!SinkValue::from(Some(3i64)).is_null());
    }

    #[test]
    fn test_sink_row_collect() {
        let row: SinkRow = vec![SinkValue::Int(1), SinkValue::from("a")]
            .into_iter()
            .collect();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(1), Some(&SinkValue::Text("a".to_string())));
        assert_eq!(row.get(2), None);
    }
}
