//! Configuration loading and CLI override tests.
//!
//! Tests TOML parsing, file loading, and the file → CLI precedence
//! chain the daemon applies at startup.

use clap::Parser;

use sidewinder_core::config::SidewinderConfig;
use sidewinder_daemon::cli::DaemonCli;

#[test]
fn test_parse_full_config() {
    // Given: A complete TOML config
    let toml_str = r#"
[general]
log_level = "debug"
log_format = "pretty"

[runtime]
docker_socket = "/run/user/1000/docker.sock"

[controller]
workers = 4
max_retries = 3
sync_timeout_secs = 10
poll_interval_secs = 5
requeue_backoff_base_ms = 250

[shutdown]
attempts = 7
retry_delay_secs = 2
"#;

    // When: Parsing
    let config = SidewinderConfig::parse(toml_str).expect("should parse full config");

    // Then: All sections are populated
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.runtime.docker_socket, "/run/user/1000/docker.sock");
    assert_eq!(config.controller.workers, 4);
    assert_eq!(config.controller.max_retries, 3);
    assert_eq!(config.shutdown.attempts, 7);
    config.validate().expect("should be valid");
}

#[test]
fn test_partial_config_uses_defaults() {
    // Given: Only the controller section
    let toml_str = r#"
[controller]
workers = 2
"#;

    // When: Parsing
    let config = SidewinderConfig::parse(toml_str).expect("should parse partial config");

    // Then: Unspecified fields fall back to defaults
    assert_eq!(config.controller.workers, 2);
    assert_eq!(config.controller.max_retries, 5);
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.shutdown.attempts, 5);
}

#[tokio::test]
async fn test_load_from_file() {
    // Given: A config file on disk
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("sidewinder.toml");
    tokio::fs::write(&path, "[general]\nlog_level = \"warn\"\n")
        .await
        .expect("should write config file");

    // When: Loading
    let config = SidewinderConfig::from_file(&path)
        .await
        .expect("should load config file");

    // Then
    assert_eq!(config.general.log_level, "warn");
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let result = SidewinderConfig::from_file("/nonexistent/sidewinder.toml").await;
    assert!(result.is_err());
}

#[test]
fn test_cli_overrides_take_precedence() {
    // Given: A config file value and a CLI override
    let mut config =
        SidewinderConfig::parse("[general]\nlog_level = \"info\"\n").expect("should parse");
    let cli = DaemonCli::parse_from([
        "sidewinder-daemon",
        "--log-level",
        "trace",
        "--docker-socket",
        "/run/docker.sock",
    ]);

    // When: Applying overrides the way main() does
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(socket) = &cli.docker_socket {
        config.runtime.docker_socket = socket.clone();
    }

    // Then: CLI wins
    assert_eq!(config.general.log_level, "trace");
    assert_eq!(config.runtime.docker_socket, "/run/docker.sock");
    config.validate().expect("should be valid after overrides");
}

#[test]
fn test_invalid_override_fails_validation() {
    // Given: A nonsense log level from the CLI
    let mut config = SidewinderConfig::default();
    config.general.log_level = "verbose".to_owned();

    // Then: Validation rejects it before the daemon starts
    assert!(config.validate().is_err());
}
