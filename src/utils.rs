// ABOUTME: Shared helpers for identifier safety, retries and bounded connector calls
// ABOUTME: Used by both connectors and by startup configuration validation

use anyhow::{bail, Result};
use std::future::Future;
use std::time::Duration;

/// Longest identifier accepted, matching PostgreSQL's `NAMEDATALEN - 1`.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Longest identifier echoed back in error messages and logs.
const MAX_DISPLAY_LEN: usize = 100;

/// Upper bound on the sleep between two retry attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Check that a database or table name is safe to interpolate into a query.
///
/// Names handed to ClickHouse and PostgreSQL are quoted anyway, but only
/// plain ASCII identifiers are accepted from configuration: a leading letter
/// or underscore followed by letters, digits or underscores, at most 63 bytes.
/// Surrounding whitespace is ignored.
///
/// # Arguments
///
/// * `identifier` - Name taken from flags or environment (`--ch-database`, `--tables`)
///
/// # Examples
///
/// ```
/// # use clickhouse_replicator::utils::validate_identifier;
/// assert!(validate_identifier("crypto_analytics").is_ok());
/// assert!(validate_identifier("123db").is_err());
/// assert!(validate_identifier("db\"; DROP TABLE users; --").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let name = identifier.trim();
    let mut chars = name.char_indices();

    let Some((_, first)) = chars.next() else {
        bail!("Identifier is empty");
    };
    if name.len() > MAX_IDENTIFIER_LEN {
        bail!(
            "Identifier '{}' is {} bytes long; the limit is {}",
            display_identifier(name),
            name.len(),
            MAX_IDENTIFIER_LEN
        );
    }
    if !(first == '_' || first.is_ascii_alphabetic()) {
        bail!(
            "Identifier '{}' starts with '{}'; expected a letter or underscore",
            display_identifier(name),
            first.escape_default()
        );
    }
    if let Some((offset, bad)) = chars.find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric())) {
        bail!(
            "Identifier '{}' has unsupported character '{}' at byte {}; \
             only ASCII letters, digits and underscores are allowed",
            display_identifier(name),
            bad.escape_default(),
            offset
        );
    }

    Ok(())
}

/// Make an untrusted identifier printable: control characters become `?`
/// and the result is cut to 100 characters.
pub fn display_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .take(MAX_DISPLAY_LEN)
        .map(|c| if c.is_control() { '?' } else { c })
        .collect()
}

/// Quote a PostgreSQL identifier, escaping embedded double quotes.
pub fn quote_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('"');
    for ch in identifier.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Quote a ClickHouse identifier with backticks, escaping embedded backticks.
pub fn quote_clickhouse_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('`');
    for ch in identifier.chars() {
        if ch == '`' {
            quoted.push('`');
        }
        quoted.push(ch);
    }
    quoted.push('`');
    quoted
}

/// Run a fallible async operation until it succeeds or the attempts run out.
///
/// The first attempt runs immediately. Each failure is logged and followed by
/// a sleep that starts at `initial_delay` and doubles, capped at 30 seconds.
/// Used for the startup connections to PostgreSQL and ClickHouse.
///
/// # Arguments
///
/// * `operation` - Produces a fresh future for every attempt
/// * `max_retries` - Attempts after the first one (`0` means try once)
/// * `initial_delay` - Sleep before the first retry
///
/// # Returns
///
/// The first successful value, or the last error wrapped with the attempt count.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use clickhouse_replicator::utils::retry_with_backoff;
/// # async fn example() -> anyhow::Result<()> {
/// let pong = retry_with_backoff(|| async { Ok("pong") }, 3, Duration::from_secs(1)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = max_retries.saturating_add(1);
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if attempt >= attempts {
            return Err(error.context(format!("Gave up after {} attempt(s)", attempts)));
        }

        tracing::warn!(
            "Attempt {} of {} failed: {:#}. Next attempt in {:?}",
            attempt,
            attempts,
            error,
            delay
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(MAX_BACKOFF);
        attempt += 1;
    }
}

/// Run a connector call with an upper bound on its duration.
///
/// A hung source or sink would otherwise stall every table in the cycle.
pub async fn with_timeout<Fut, T>(limit: Duration, what: &str, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => bail!("{} timed out after {:?}", what, limit),
    }
}

/// Replace the password component of a URL with `***` for logging.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}
