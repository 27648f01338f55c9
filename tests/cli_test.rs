// ABOUTME: CLI tests that drive the built clickhouse-replicator binary
// ABOUTME: Cover help output, configuration validation and fatal startup connection errors

use std::process::Command;

fn replicator() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_clickhouse-replicator"));
    for var in [
        "SYNC_TABLES",
        "BATCH_SIZE",
        "SYNC_INTERVAL",
        "CALL_TIMEOUT",
        "CH_DATABASE",
        "LOG_FILE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_connection_flags() {
    let output = replicator()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--pg-host"));
    assert!(stdout.contains("--ch-host"));
    assert!(stdout.contains("--batch-size"));
    assert!(stdout.contains("--once"));
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let output = replicator()
        .env("BATCH_SIZE", "0")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Batch size must be greater than 0"));
}

#[test]
fn test_unknown_table_is_rejected() {
    let output = replicator()
        .args(["--tables", "users,orders"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown table 'orders'"));
}

#[test]
fn test_invalid_clickhouse_database_is_rejected() {
    let output = replicator()
        .args(["--ch-database", "analytics; DROP TABLE users"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn test_unreachable_source_exits_non_zero() {
    let output = replicator()
        .args(["--once", "--pg-host", "127.0.0.1", "--pg-port", "1"])
        .args(["--pg-sslmode", "disable", "--connect-retries", "0"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to connect to source database"));
}
