// ABOUTME: Integration tests for PostgresSource against a live PostgreSQL server
// ABOUTME: Cover column decoding, timestamptz watermarks, reconnects and closing (set TEST_SOURCE_URL)

use chrono::{NaiveDate, NaiveDateTime};
use clickhouse_replicator::config::{PgSslMode, PostgresConfig};
use clickhouse_replicator::source::{FetchRequest, PostgresSource, SourceConnector, Value};
use clickhouse_replicator::sync::syncer::max_position;
use clickhouse_replicator::sync::Watermark;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Helper to get the test database URL from environment
fn get_source_url() -> String {
    env::var("TEST_SOURCE_URL").expect("TEST_SOURCE_URL must be set")
}

/// Build source settings from a postgresql:// URL, tagged with a unique application name
fn source_config(source_url: &str) -> PostgresConfig {
    let url = url::Url::parse(source_url).expect("TEST_SOURCE_URL must be a valid URL");
    PostgresConfig {
        host: url.host_str().unwrap_or("localhost").to_string(),
        port: url.port().unwrap_or(5432),
        database: url.path().trim_start_matches('/').to_string(),
        user: url.username().to_string(),
        password: url.password().map(|p| p.to_string()),
        ssl_mode: PgSslMode::Disable,
        accept_invalid_certs: false,
        connect_timeout: Duration::from_secs(5),
        application_name: format!("replicator-test-{}", uuid::Uuid::new_v4().simple()),
    }
}

/// Plain setup connection, independent of the code under test
async fn setup_client(source_url: &str) -> tokio_postgres::Client {
    let (client, connection) = tokio_postgres::connect(source_url, tokio_postgres::NoTls)
        .await
        .expect("Failed to connect to source");
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Create a unique test table name to avoid conflicts
fn test_table_name() -> String {
    format!("replicator_test_{}", uuid::Uuid::new_v4().simple())
}

async fn cleanup_test_table(client: &tokio_postgres::Client, table_name: &str) {
    let _ = client
        .batch_execute(&format!(r#"DROP TABLE IF EXISTS "{}""#, table_name))
        .await;
}

fn request(table: &str, after: Option<Watermark>) -> FetchRequest<'_> {
    FetchRequest {
        table,
        ordering_column: "updated_at",
        creation_column: "created_at",
        after,
        limit: 100,
    }
}

fn utc(hour: u32, min: u32, sec: u32, micro: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_micro_opt(hour, min, sec, micro)
        .unwrap()
}

async fn backends_named(client: &tokio_postgres::Client, application_name: &str) -> i64 {
    client
        .query_one(
            "SELECT count(*) FROM pg_stat_activity WHERE application_name = $1",
            &[&application_name],
        )
        .await
        .expect("Failed to query pg_stat_activity")
        .get(0)
}

/// Test: column types decode into the expected values
#[tokio::test]
#[ignore]
async fn test_fetch_decodes_column_types() {
    let source_url = get_source_url();
    let admin = setup_client(&source_url).await;
    let table_name = test_table_name();

    admin
        .batch_execute(&format!(
            r#"
            CREATE TABLE "{t}" (
                id BIGINT,
                ip_address INET,
                balance NUMERIC(20, 8),
                note TEXT,
                is_active BOOLEAN,
                external_id UUID,
                metadata JSONB,
                created_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ
            );
            INSERT INTO "{t}" VALUES (
                1, '10.0.0.7', 1234.50000000, NULL, true,
                'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11', '{{"tier": 2}}',
                '2024-06-01 12:00:00+02', '2024-06-01 12:00:00.25+02'
            );
            "#,
            t = table_name
        ))
        .await
        .expect("Failed to setup test table");

    let mut source = PostgresSource::connect_with_retry(source_config(&source_url), 0)
        .await
        .expect("Failed to connect PostgresSource");
    let records = source
        .fetch(&request(&table_name, None))
        .await
        .expect("Failed to fetch");

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.get("id"), &Value::Int(1));
    assert_eq!(
        record.get("ip_address"),
        &Value::Inet("10.0.0.7".parse().unwrap())
    );
    assert_eq!(
        record.get("balance"),
        &Value::Numeric(Decimal::from_str("1234.50000000").unwrap())
    );
    assert_eq!(record.get("note"), &Value::Null);
    assert_eq!(record.get("is_active"), &Value::Bool(true));
    assert_eq!(
        record.get("external_id"),
        &Value::Uuid(uuid::Uuid::parse_str("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap())
    );
    let metadata: serde_json::Value =
        serde_json::from_str(&record.get("metadata").as_text().unwrap()).unwrap();
    assert_eq!(metadata["tier"], 2);
    // timestamptz arrives converted to UTC
    assert_eq!(record.get("created_at"), &Value::Timestamp(utc(10, 0, 0, 0)));
    assert_eq!(
        record.get("updated_at"),
        &Value::Timestamp(utc(10, 0, 0, 250_000))
    );

    source.close().await.unwrap();
    cleanup_test_table(&admin, &table_name).await;
}

/// Test: a watermark taken from fetched timestamptz rows excludes exactly those rows
#[tokio::test]
#[ignore]
async fn test_timestamptz_watermark_round_trip() {
    let source_url = get_source_url();
    let admin = setup_client(&source_url).await;
    let table_name = test_table_name();

    admin
        .batch_execute(&format!(
            r#"
            CREATE TABLE "{t}" (id BIGINT, created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ);
            INSERT INTO "{t}" VALUES
                (1, '2024-06-01 08:00:00+00', '2024-06-01 08:00:00+00'),
                (2, '2024-06-01 08:30:00+00', '2024-06-01 11:00:00.5+02');
            "#,
            t = table_name
        ))
        .await
        .expect("Failed to setup test table");

    let mut source = PostgresSource::connect_with_retry(source_config(&source_url), 0)
        .await
        .expect("Failed to connect PostgresSource");

    let first = source.fetch(&request(&table_name, None)).await.unwrap();
    assert_eq!(first.len(), 2);
    let watermark = max_position(&first, "updated_at").expect("rows carry updated_at");
    assert_eq!(watermark.position(), utc(9, 0, 0, 500_000));

    let again = source
        .fetch(&request(&table_name, Some(watermark)))
        .await
        .unwrap();
    assert!(again.is_empty(), "rows at the watermark must not be re-read");

    // One microsecond past the watermark is strictly greater and must be returned
    admin
        .batch_execute(&format!(
            r#"INSERT INTO "{}" VALUES (3, '2024-06-01 09:00:00+00', '2024-06-01 09:00:00.500001+00')"#,
            table_name
        ))
        .await
        .unwrap();

    let next = source
        .fetch(&request(&table_name, Some(watermark)))
        .await
        .unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].get("id"), &Value::Int(3));
    assert_eq!(
        max_position(&next, "updated_at").unwrap().position(),
        utc(9, 0, 0, 500_001)
    );

    source.close().await.unwrap();
    cleanup_test_table(&admin, &table_name).await;
}

/// Test: the source reconnects after its server session is terminated
#[tokio::test]
#[ignore]
async fn test_fetch_reconnects_after_backend_terminated() {
    let source_url = get_source_url();
    let admin = setup_client(&source_url).await;
    let table_name = test_table_name();

    admin
        .batch_execute(&format!(
            r#"
            CREATE TABLE "{t}" (id BIGINT, created_at TIMESTAMP, updated_at TIMESTAMP);
            INSERT INTO "{t}" VALUES (1, '2024-06-01 08:00:00', '2024-06-01 08:00:00');
            "#,
            t = table_name
        ))
        .await
        .expect("Failed to setup test table");

    let config = source_config(&source_url);
    let application_name = config.application_name.clone();
    let mut source = PostgresSource::connect_with_retry(config, 0)
        .await
        .expect("Failed to connect PostgresSource");
    assert_eq!(source.fetch(&request(&table_name, None)).await.unwrap().len(), 1);

    let terminated: bool = admin
        .query_one(
            "SELECT bool_or(pg_terminate_backend(pid)) FROM pg_stat_activity WHERE application_name = $1",
            &[&application_name],
        )
        .await
        .expect("Failed to terminate backend")
        .get(0);
    assert!(terminated);
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The fetch that discovers the dead session may fail; the one after must not.
    let records = match source.fetch(&request(&table_name, None)).await {
        Ok(records) => records,
        Err(_) => source
            .fetch(&request(&table_name, None))
            .await
            .expect("fetch after reconnect should succeed"),
    };
    assert_eq!(records.len(), 1);
    assert!(!source.is_closed());

    source.close().await.unwrap();
    cleanup_test_table(&admin, &table_name).await;
}

/// Test: close ends the server session and later fetches fail
#[tokio::test]
#[ignore]
async fn test_close_releases_connection() {
    let source_url = get_source_url();
    let admin = setup_client(&source_url).await;

    let config = source_config(&source_url);
    let application_name = config.application_name.clone();
    let mut source = PostgresSource::connect_with_retry(config, 0)
        .await
        .expect("Failed to connect PostgresSource");
    assert_eq!(backends_named(&admin, &application_name).await, 1);

    source.close().await.unwrap();
    assert!(source.is_closed());

    let mut remaining = 1;
    for _ in 0..20 {
        remaining = backends_named(&admin, &application_name).await;
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(remaining, 0, "server session should end after close");

    let err = source
        .fetch(&request("users", None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("closed"));

    // Closing twice is harmless
    source.close().await.unwrap();
}
