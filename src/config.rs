// ABOUTME: Process configuration - CLI flags with environment fallbacks
// ABOUTME: Parses and validates source, sink and sync-loop settings at startup

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::time::Duration;

use crate::utils::validate_identifier;

pub const DEFAULT_APPLICATION_NAME: &str = "clickhouse-replicator";

/// TLS negotiation mode for the source connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PgSslMode {
    Disable,
    Prefer,
    Require,
}

impl From<PgSslMode> for tokio_postgres::config::SslMode {
    fn from(mode: PgSslMode) -> Self {
        match mode {
            PgSslMode::Disable => tokio_postgres::config::SslMode::Disable,
            PgSslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            PgSslMode::Require => tokio_postgres::config::SslMode::Require,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// PostgreSQL host
    #[arg(long = "pg-host", env = "PG_HOST", default_value = "postgres-source")]
    pub pg_host: String,
    /// PostgreSQL port
    #[arg(long = "pg-port", env = "PG_PORT", default_value_t = 5432)]
    pub pg_port: u16,
    /// PostgreSQL database to replicate from
    #[arg(long = "pg-database", env = "PG_DATABASE", default_value = "crypto_exchange")]
    pub pg_database: String,
    /// PostgreSQL user
    #[arg(long = "pg-user", env = "PG_USER", default_value = "exchange_admin")]
    pub pg_user: String,
    /// PostgreSQL password
    #[arg(long = "pg-password", env = "PG_PASSWORD", hide_env_values = true)]
    pub pg_password: Option<String>,
    /// TLS mode for the PostgreSQL connection
    #[arg(long = "pg-sslmode", env = "PG_SSLMODE", value_enum, default_value = "prefer")]
    pub pg_sslmode: PgSslMode,
    /// Accept invalid/self-signed certificates (insecure - use only for testing)
    #[arg(long = "pg-accept-invalid-certs", env = "PG_ACCEPT_INVALID_CERTS", default_value_t = false)]
    pub pg_accept_invalid_certs: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    /// ClickHouse host
    #[arg(long = "ch-host", env = "CH_HOST", default_value = "clickhouse")]
    pub ch_host: String,
    /// ClickHouse HTTP port
    #[arg(long = "ch-port", env = "CH_PORT", default_value_t = 8123)]
    pub ch_port: u16,
    /// ClickHouse database holding the replicated tables
    #[arg(long = "ch-database", env = "CH_DATABASE", default_value = "crypto_analytics")]
    pub ch_database: String,
    /// ClickHouse user
    #[arg(long = "ch-user", env = "CH_USER", default_value = "analytics_user")]
    pub ch_user: String,
    /// ClickHouse password
    #[arg(long = "ch-password", env = "CH_PASSWORD", hide_env_values = true)]
    pub ch_password: Option<String>,
    /// Use HTTPS for the ClickHouse connection
    #[arg(long = "ch-secure", env = "CH_SECURE", default_value_t = false)]
    pub ch_secure: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Seconds to sleep between sync cycles
    #[arg(long = "sync-interval", env = "SYNC_INTERVAL", default_value_t = 60)]
    pub sync_interval: u64,
    /// Maximum rows fetched per table per cycle
    #[arg(long = "batch-size", env = "BATCH_SIZE", default_value_t = 1000)]
    pub batch_size: usize,
    /// Seconds a single fetch or insert may take before it is abandoned
    #[arg(long = "call-timeout", env = "CALL_TIMEOUT", default_value_t = 120)]
    pub call_timeout: u64,
    /// Connection attempts retried at startup before giving up
    #[arg(long = "connect-retries", env = "CONNECT_RETRIES", default_value_t = 3)]
    pub connect_retries: u32,
    /// Replicate only these tables (comma-separated; default: all registered tables)
    #[arg(long = "tables", env = "SYNC_TABLES", value_delimiter = ',')]
    pub tables: Vec<String>,
}

/// Validated PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub ssl_mode: PgSslMode,
    pub accept_invalid_certs: bool,
    pub connect_timeout: Duration,
    /// Reported to the server as `application_name` (visible in `pg_stat_activity`)
    pub application_name: String,
}

impl PostgresConfig {
    /// Connection description with the password left out, for logs.
    pub fn display_target(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .application_name(&self.application_name)
            .connect_timeout(self.connect_timeout)
            .ssl_mode(self.ssl_mode.into());
        if let Some(ref password) = self.password {
            config.password(password);
        }
        config
    }
}

/// Validated ClickHouse connection settings.
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub secure: bool,
}

impl ClickHouseConfig {
    /// Base URL of the HTTP interface.
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

/// Validated settings for the sync loop.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub interval: Duration,
    pub batch_size: usize,
    pub call_timeout: Duration,
    pub connect_retries: u32,
    /// Empty means every registered table
    pub tables: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 1000,
            call_timeout: Duration::from_secs(120),
            connect_retries: 3,
            tables: Vec::new(),
        }
    }
}

impl SourceArgs {
    pub fn into_config(self) -> Result<PostgresConfig> {
        if self.pg_host.trim().is_empty() {
            bail!("PostgreSQL host cannot be empty");
        }
        if self.pg_database.trim().is_empty() {
            bail!("PostgreSQL database cannot be empty");
        }
        Ok(PostgresConfig {
            host: self.pg_host,
            port: self.pg_port,
            database: self.pg_database,
            user: self.pg_user,
            password: self.pg_password.filter(|p| !p.is_empty()),
            ssl_mode: self.pg_sslmode,
            accept_invalid_certs: self.pg_accept_invalid_certs,
            connect_timeout: Duration::from_secs(10),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        })
    }
}

impl SinkArgs {
    pub fn into_config(self) -> Result<ClickHouseConfig> {
        if self.ch_host.trim().is_empty() {
            bail!("ClickHouse host cannot be empty");
        }
        validate_identifier(&self.ch_database).context("Invalid ClickHouse database name")?;
        Ok(ClickHouseConfig {
            host: self.ch_host,
            port: self.ch_port,
            database: self.ch_database,
            user: self.ch_user,
            password: self.ch_password.filter(|p| !p.is_empty()),
            secure: self.ch_secure,
        })
    }
}

impl SyncArgs {
    pub fn into_settings(self) -> Result<SyncSettings> {
        if self.sync_interval == 0 {
            bail!("Sync interval must be at least 1 second");
        }
        if self.batch_size == 0 {
            bail!("Batch size must be greater than 0");
        }
        if self.call_timeout == 0 {
            bail!("Call timeout must be at least 1 second");
        }

        let tables = self
            .tables
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>();
        for table in &tables {
            validate_identifier(table).context("Invalid table name in --tables")?;
        }

        Ok(SyncSettings {
            interval: Duration::from_secs(self.sync_interval),
            batch_size: self.batch_size,
            call_timeout: Duration::from_secs(self.call_timeout),
            connect_retries: self.connect_retries,
            tables,
        })
    }
}
