// ABOUTME: ClickHouseSink - bulk inserts over the ClickHouse HTTP interface
// ABOUTME: Each batch is one INSERT ... FORMAT JSONEachRow request, accepted or rejected whole

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::time::Duration;

use super::{SinkConnector, SinkRow, SinkValue};
use crate::config::ClickHouseConfig;
use crate::utils::{quote_clickhouse_ident, redact_url, retry_with_backoff};

/// Writes transformed rows to ClickHouse.
///
/// The HTTP interface is stateless, so one `reqwest::Client` (with its
/// keep-alive pool) is reused for every table and cycle.
pub struct ClickHouseSink {
    client: reqwest::Client,
    endpoint: url::Url,
    config: ClickHouseConfig,
    closed: bool,
}

impl ClickHouseSink {
    /// Build a sink for the given server. Does not touch the network.
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        let endpoint = url::Url::parse(&config.endpoint())
            .with_context(|| format!("Invalid ClickHouse endpoint {}", config.endpoint()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("clickhouse-replicator/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build ClickHouse HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            config,
            closed: false,
        })
    }

    /// Build a sink and wait until the server answers `SELECT 1`.
    ///
    /// # Arguments
    ///
    /// * `config` - Server address, database and credentials
    /// * `max_retries` - Extra ping attempts after the first failure, with
    ///   exponential backoff starting at one second
    ///
    /// # Errors
    ///
    /// Fails when the endpoint is not a valid URL, or when every ping attempt
    /// fails (unreachable server, bad credentials, unknown database).
    pub async fn connect_with_retry(config: ClickHouseConfig, max_retries: u32) -> Result<Self> {
        let sink = Self::new(config)?;
        retry_with_backoff(|| sink.ping(), max_retries, Duration::from_secs(1))
            .await
            .with_context(|| {
                format!(
                    "ClickHouse at {} is not accepting queries",
                    redact_url(sink.endpoint.as_str())
                )
            })?;

        tracing::info!(
            "Connected to ClickHouse at {} (database {})",
            redact_url(sink.endpoint.as_str()),
            sink.config.database
        );
        Ok(sink)
    }

    /// Run `SELECT 1` against the server.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .request()
            .query(&[("query", "SELECT 1")])
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to reach ClickHouse at {}",
                    redact_url(self.endpoint.as_str())
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("ClickHouse ping failed ({}): {}", status, body.trim());
        }
        Ok(())
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .query(&[("database", self.config.database.as_str())])
            .header("X-ClickHouse-User", &self.config.user);
        if let Some(ref password) = self.config.password {
            builder = builder.header("X-ClickHouse-Key", password);
        }
        builder
    }
}

#[async_trait]
impl SinkConnector for ClickHouseSink {
    async fn bulk_insert(&mut self, table: &str, columns: &[&str], rows: &[SinkRow]) -> Result<()> {
        if self.closed {
            bail!("ClickHouse sink is closed");
        }
        if rows.is_empty() {
            return Ok(());
        }

        let query = build_insert_query(&self.config.database, table, columns);
        let body = encode_json_each_row(columns, rows)
            .with_context(|| format!("Failed to encode batch for {}", table))?;

        let response = self
            .request()
            .query(&[
                ("query", query.as_str()),
                ("date_time_input_format", "best_effort"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to send insert into {}.{}",
                    self.config.database, table
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            bail!(
                "ClickHouse rejected insert of {} rows into {}.{} ({}): {}",
                rows.len(),
                self.config.database,
                table,
                status,
                message.trim()
            );
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "clickhouse"
    }
}

/// Build the INSERT statement sent as the `query` parameter; rows travel in the body.
///
/// ```sql
/// INSERT INTO `db`.`table` (`col1`, `col2`) FORMAT JSONEachRow
/// ```
fn build_insert_query(database: &str, table: &str, columns: &[&str]) -> String {
    let quoted_columns: Vec<String> = columns.iter().map(|c| quote_clickhouse_ident(c)).collect();

    format!(
        "INSERT INTO {}.{} ({}) FORMAT JSONEachRow",
        quote_clickhouse_ident(database),
        quote_clickhouse_ident(table),
        quoted_columns.join(", ")
    )
}

/// A row serialized as a JSON object keyed by column name.
struct JsonRow<'a> {
    columns: &'a [&'a str],
    values: &'a [SinkValue],
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Encode rows as newline-delimited JSON objects.
fn encode_json_each_row(columns: &[&str], rows: &[SinkRow]) -> Result<String> {
    let mut body = String::new();
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            bail!(
                "Row {} has {} values but {} columns were declared",
                idx,
                row.len(),
                columns.len()
            );
        }
        let line = serde_json::to_string(&JsonRow {
            columns,
            values: row.values(),
        })?;
        body.push_str(&line);
        body.push('\n');
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> ClickHouseConfig {
        ClickHouseConfig {
            host: "clickhouse".to_string(),
            port: 8123,
            database: "crypto_analytics".to_string(),
            user: "analytics_user".to_string(),
            password: Some("secret".to_string()),
            secure: false,
        }
    }

    #[test]
    fn test_build_insert_query() {
        let query = build_insert_query("crypto_analytics", "users", &["user_id", "email"]);
        assert_eq!(
            query,
            "INSERT INTO `crypto_analytics`.`users` (`user_id`, `email`) FORMAT JSONEachRow"
        );
    }

    #[test]
    fn test_encode_json_each_row() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let rows = vec![
            SinkRow::new(vec![
                SinkValue::Int(1),
                SinkValue::from("XX"),
                SinkValue::Timestamp(ts),
            ]),
            SinkRow::new(vec![SinkValue::Int(2), SinkValue::from(""), SinkValue::Null]),
        ];

        let body = encode_json_each_row(&["user_id", "country_code", "last_login"], &rows).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["user_id"], 1);
        assert_eq!(first["country_code"], "XX");
        assert_eq!(first["last_login"], "2024-01-02 03:04:05.000000");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second["last_login"].is_null());
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_encode_rejects_width_mismatch() {
        let rows = vec![SinkRow::new(vec![SinkValue::Int(1)])];
        let err = encode_json_each_row(&["a", "b"], &rows).unwrap_err();
        assert!(err.to_string().contains("1 values but 2 columns"));
    }

    #[test]
    fn test_new_builds_endpoint() {
        let sink = ClickHouseSink::new(config()).unwrap();
        assert_eq!(sink.endpoint.as_str(), "http://clickhouse:8123/");
        assert_eq!(sink.name(), "clickhouse");
    }

    #[tokio::test]
    async fn test_closed_sink_rejects_inserts() {
        let mut sink = ClickHouseSink::new(config()).unwrap();
        sink.close().await.unwrap();
        let rows = vec![SinkRow::new(vec![SinkValue::Int(1)])];
        let err = sink.bulk_insert("users", &["user_id"], &rows).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
