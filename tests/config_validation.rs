//! Integration tests for configuration loading and validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use diag_engine::config::{
    AuxConfig, EngineConfig, LoggingConfig, ServerConfig, TransportConfig, DEFAULT_SOCKET_PATH,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = EngineConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.server.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
    assert!(config.aux.socket_path.is_none());
    assert_eq!(config.access.privileged_uids, vec![0]);
}

#[test]
fn test_empty_socket_path() {
    let mut config = EngineConfig::default();
    config.server.socket_path = PathBuf::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("socket path cannot be empty")));
}

#[test]
fn test_zero_max_connections() {
    let config = EngineConfig::default_with_overrides(|c| c.server.max_connections = 0);
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Max connections must be greater than 0")));
}

#[test]
fn test_invalid_socket_mode() {
    let server = ServerConfig {
        socket_mode: 0o4777,
        ..ServerConfig::default()
    };
    assert!(server.validate().iter().any(|e| e.contains("Invalid socket mode")));
}

#[test]
fn test_shutdown_timeout_bounds() {
    let mut server = ServerConfig::default();
    server.shutdown_timeout = Duration::from_millis(50);
    assert!(server.validate().iter().any(|e| e.contains("too short")));

    server.shutdown_timeout = Duration::from_secs(120);
    assert!(server.validate().iter().any(|e| e.contains("too long")));
}

#[test]
fn test_aux_in_flight_bounds() {
    let mut aux = AuxConfig::default();
    aux.max_in_flight = 0;
    assert!(aux.validate().iter().any(|e| e.contains("greater than 0")));

    aux.max_in_flight = 5000;
    assert!(aux.validate().iter().any(|e| e.contains("too large")));
}

#[test]
fn test_aux_timeout_too_short() {
    let aux = AuxConfig {
        request_timeout: Duration::from_millis(1),
        ..AuxConfig::default()
    };
    assert!(aux.validate().iter().any(|e| e.contains("request timeout too short")));
}

#[test]
fn test_aux_socket_must_differ_from_listener() {
    let config = EngineConfig::default_with_overrides(|c| {
        c.aux.socket_path = Some(c.server.socket_path.clone());
    });
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("must differ")));
}

#[test]
fn test_payload_size_capped_by_length_field() {
    let transport = TransportConfig {
        max_payload_size: 70_000,
    };
    assert!(transport.validate().iter().any(|e| e.contains("too large")));

    let transport = TransportConfig {
        max_payload_size: 8,
    };
    assert!(transport.validate().iter().any(|e| e.contains("too small")));
}

#[test]
fn test_logging_requires_an_output() {
    let logging = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..LoggingConfig::default()
    };
    assert!(logging
        .validate()
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_file_logging_requires_path() {
    let logging = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..LoggingConfig::default()
    };
    assert!(logging
        .validate()
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_validate_strict_collects_every_error() {
    let config = EngineConfig::default_with_overrides(|c| {
        c.server.max_connections = 0;
        c.aux.max_in_flight = 0;
    });
    let err = config.validate_strict().unwrap_err().to_string();
    assert!(err.contains("Max connections"));
    assert!(err.contains("in-flight"));
}

#[test]
fn test_partial_toml_falls_back_to_defaults() {
    let config = EngineConfig::from_toml(
        r#"
        [server]
        socket_path = "/tmp/diagd-test.sock"

        [aux]
        socket_path = "/tmp/diagd-aux.sock"
        request_timeout = 250

        [access]
        privileged_gids = [10]

        [logging]
        log_level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.server.socket_path, PathBuf::from("/tmp/diagd-test.sock"));
    assert_eq!(config.server.max_connections, ServerConfig::default().max_connections);
    assert_eq!(
        config.aux.socket_path,
        Some(PathBuf::from("/tmp/diagd-aux.sock"))
    );
    assert_eq!(config.aux.request_timeout, Duration::from_millis(250));
    assert_eq!(config.access.privileged_gids, vec![10]);
    assert_eq!(config.logging.log_level, Level::DEBUG);

    let link = config.aux_link().expect("aux configured");
    assert_eq!(link.max_in_flight, config.aux.max_in_flight);
    assert_eq!(link.max_payload, config.transport.max_payload_size);
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let err = EngineConfig::from_toml("[server]\nmax_connections = \"many\"").unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_env_overrides() {
    let config = EngineConfig::default()
        .with_overrides([
            ("DIAGD_SOCKET_PATH", "/tmp/env.sock"),
            ("DIAGD_AUX_SOCKET_PATH", "/tmp/env-aux.sock"),
            ("DIAGD_AUX_TIMEOUT_MS", "750"),
            ("DIAGD_AUX_MAX_IN_FLIGHT", "8"),
            ("DIAGD_MAX_CONNECTIONS", "16"),
            ("DIAGD_LOG_LEVEL", "warn"),
            ("HOME", "/root"),
        ])
        .unwrap();

    assert_eq!(config.server.socket_path, PathBuf::from("/tmp/env.sock"));
    assert_eq!(config.aux.socket_path, Some(PathBuf::from("/tmp/env-aux.sock")));
    assert_eq!(config.aux.request_timeout, Duration::from_millis(750));
    assert_eq!(config.aux.max_in_flight, 8);
    assert_eq!(config.server.max_connections, 16);
    assert_eq!(config.logging.log_level, Level::WARN);
}

#[test]
fn test_bad_env_override_is_rejected() {
    let err = EngineConfig::default()
        .with_overrides([("DIAGD_AUX_TIMEOUT_MS", "soon")])
        .unwrap_err();
    assert!(err.to_string().contains("DIAGD_AUX_TIMEOUT_MS"));
}

#[test]
fn test_empty_aux_env_disables_forwarding() {
    let config = EngineConfig::default_with_overrides(|c| {
        c.aux.socket_path = Some(PathBuf::from("/tmp/aux.sock"));
    })
    .with_overrides([("DIAGD_AUX_SOCKET_PATH", "")])
    .unwrap();
    assert!(config.aux.socket_path.is_none());
    assert!(config.aux_link().is_none());
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diagd.toml");

    let config = EngineConfig::default_with_overrides(|c| {
        c.server.max_connections = 7;
        c.aux.socket_path = Some(PathBuf::from("/tmp/aux.sock"));
        c.aux.reconnect_delay = Duration::from_millis(1500);
    });
    config.save_to_file(&path).unwrap();

    let loaded = EngineConfig::from_file(&path).unwrap();
    assert_eq!(loaded.server.max_connections, 7);
    assert_eq!(loaded.aux.socket_path, Some(PathBuf::from("/tmp/aux.sock")));
    assert_eq!(loaded.aux.reconnect_delay, Duration::from_millis(1500));
}

#[test]
fn test_example_config_parses() {
    let example = EngineConfig::example_config();
    assert!(example.contains("[server]"));
    let parsed = EngineConfig::from_toml(&example).unwrap();
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_missing_file_is_a_config_error() {
    assert!(EngineConfig::from_file("/nonexistent/diagd.toml").is_err());
}
