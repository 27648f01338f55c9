// ABOUTME: PostgresSource - reads ordered batches from source tables via tokio-postgres
// ABOUTME: Decodes rows by column type into SourceRecords and reconnects after connection loss

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::net::IpAddr;
use std::time::Duration;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Row};

use super::{FetchRequest, SourceConnector, SourceRecord, Value};
use crate::config::PostgresConfig;
use crate::utils::{quote_ident, retry_with_backoff};

/// Reads rows from PostgreSQL for incremental replication.
///
/// Holds one long-lived connection for the life of the process. The session
/// time zone is pinned to UTC so that watermarks (naive UTC timestamps)
/// compare the same way against `timestamp` and `timestamptz` columns.
///
/// `client` is `None` once the source has been closed; fetching after that
/// is an error rather than a silent reconnect.
pub struct PostgresSource {
    client: Option<Client>,
    config: PostgresConfig,
}

impl PostgresSource {
    /// Connect, retrying with exponential backoff up to `max_retries` times.
    ///
    /// # Arguments
    ///
    /// * `config` - Server address, credentials and TLS mode
    /// * `max_retries` - Extra attempts after the first failure (`0` tries once)
    ///
    /// # Errors
    ///
    /// Returns the last connection error once every attempt has failed.
    pub async fn connect_with_retry(config: PostgresConfig, max_retries: u32) -> Result<Self> {
        let client = retry_with_backoff(
            || open_connection(&config),
            max_retries,
            Duration::from_secs(1),
        )
        .await
        .with_context(|| format!("Failed to connect to {}", config.display_target()))?;

        tracing::info!("Connected to PostgreSQL at {}", config.display_target());
        Ok(Self {
            client: Some(client),
            config,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Live client, reopening the connection if the server side has gone away.
    ///
    /// A failed reconnect keeps the dead handle, so the next fetch tries again.
    async fn connected_client(&mut self) -> Result<&Client> {
        let connection_lost = match &self.client {
            None => bail!("PostgreSQL source is closed"),
            Some(client) => client.is_closed(),
        };

        if connection_lost {
            tracing::warn!(
                "PostgreSQL connection to {} was closed, reconnecting",
                self.config.display_target()
            );
            let client = open_connection(&self.config)
                .await
                .context("Failed to reconnect to PostgreSQL")?;
            self.client = Some(client);
        }

        self.client.as_ref().context("PostgreSQL source is closed")
    }
}

#[async_trait]
impl SourceConnector for PostgresSource {
    async fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<Vec<SourceRecord>> {
        let client = self.connected_client().await?;

        let query = build_fetch_query(request);
        let limit = i64::try_from(request.limit).unwrap_or(i64::MAX);

        let rows = match request.after {
            Some(watermark) => {
                let after = watermark.to_string();
                client.query(&query, &[&after, &limit]).await
            }
            None => client.query(&query, &[&limit]).await,
        }
        .with_context(|| format!("Failed to read batch from {}", request.table))?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the only Client handle ends the spawned connection task,
        // which sends Terminate and closes the socket.
        if self.client.take().is_some() {
            tracing::debug!(
                "Closed PostgreSQL connection to {}",
                self.config.display_target()
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "postgresql"
    }
}

async fn open_connection(config: &PostgresConfig) -> Result<Client> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .context("Failed to build TLS connector")?;
    let connector = postgres_native_tls::MakeTlsConnector::new(tls);

    let (client, connection) = config
        .to_pg_config()
        .connect(connector)
        .await
        .context("PostgreSQL connection failed")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    client
        .batch_execute("SET TIME ZONE 'UTC'")
        .await
        .context("Failed to set session time zone")?;

    Ok(client)
}

/// Build the range-scan query for one fetch.
///
/// Without a watermark:
/// ```sql
/// SELECT * FROM "users" ORDER BY "created_at" LIMIT $1
/// ```
/// With a watermark:
/// ```sql
/// SELECT * FROM "users" WHERE "updated_at" > $1::timestamp ORDER BY "updated_at" LIMIT $2
/// ```
fn build_fetch_query(request: &FetchRequest<'_>) -> String {
    let table = quote_ident(request.table);
    let order_by = quote_ident(request.order_by());

    if request.after.is_some() {
        format!(
            "SELECT * FROM {} WHERE {} > $1::text::timestamp ORDER BY {} LIMIT $2",
            table, order_by, order_by
        )
    } else {
        format!("SELECT * FROM {} ORDER BY {} LIMIT $1", table, order_by)
    }
}

/// Convert a tokio_postgres Row to a SourceRecord using each column's type.
///
/// Values that fail to decode, and types with no mapping, become `Value::Null`
/// so a single odd column never fails the fetch.
fn row_to_record(row: &Row) -> SourceRecord {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            (
                column.name().to_string(),
                decode_value(row, idx, column.type_()),
            )
        })
        .collect()
}

fn decode_value(row: &Row, idx: usize, ty: &Type) -> Value {
    fn get<'a, T>(row: &'a Row, idx: usize) -> Option<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    match *ty {
        Type::BOOL => get::<bool>(row, idx).into(),
        Type::INT2 => get::<i16>(row, idx).map(|v| Value::Int(i64::from(v))).into(),
        Type::INT4 => get::<i32>(row, idx).map(|v| Value::Int(i64::from(v))).into(),
        Type::INT8 => get::<i64>(row, idx).into(),
        Type::FLOAT4 => get::<f32>(row, idx).map(|v| Value::Float(f64::from(v))).into(),
        Type::FLOAT8 => get::<f64>(row, idx).into(),
        Type::NUMERIC => get::<Decimal>(row, idx).into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get::<String>(row, idx).into(),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx).into(),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)
            .map(|ts| ts.naive_utc())
            .into(),
        Type::DATE => get::<NaiveDate>(row, idx)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .into(),
        Type::INET => get::<IpAddr>(row, idx).into(),
        Type::UUID => get::<uuid::Uuid>(row, idx).into(),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)
            .map(|v| Value::Text(v.to_string()))
            .into(),
        _ => {
            tracing::debug!(
                "Column {} has unsupported type {}, reading as NULL",
                row.columns()[idx].name(),
                ty
            );
            Value::Null
        }
    }
}
