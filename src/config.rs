//! # Configuration Management
//!
//! Centralized configuration for the diagnostics daemon.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - `DIAGD_*` environment overrides via `with_env_overrides()`
//!
//! ## Sections
//! - `server`: listening socket and connection limits
//! - `access`: which peer credentials count as privileged
//! - `aux`: the chained aux engine, if any
//! - `transport`: frame size limit shared by both sockets
//! - `logging`: subscriber setup

use crate::core::frame::{MAX_PAYLOAD_SIZE, PAYLOAD_LEN_LIMIT};
use crate::error::{EngineError, Result};
use crate::protocol::access::TrustPolicy;
use crate::transport::aux::AuxLinkConfig;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Default listening socket.
pub const DEFAULT_SOCKET_PATH: &str = "/run/diagd/diagd.sock";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "DIAGD_";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub aux: AuxConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| EngineError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with the process environment applied on top
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `DIAGD_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(std::env::vars())
    }

    /// Apply `DIAGD_*` key/value overrides; other keys are ignored.
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "SOCKET_PATH" => self.server.socket_path = PathBuf::from(value),
                "MAX_CONNECTIONS" => self.server.max_connections = parse_env(name, value)?,
                "AUX_SOCKET_PATH" => {
                    self.aux.socket_path = (!value.is_empty()).then(|| PathBuf::from(value))
                }
                "AUX_TIMEOUT_MS" => {
                    self.aux.request_timeout = Duration::from_millis(parse_env(name, value)?)
                }
                "AUX_MAX_IN_FLIGHT" => self.aux.max_in_flight = parse_env(name, value)?,
                "LOG_LEVEL" => {
                    self.logging.log_level = Level::from_str(value).map_err(|_| {
                        EngineError::ConfigError(format!("Invalid log level in {ENV_PREFIX}{name}: {value}"))
                    })?
                }
                _ => {}
            }
        }
        Ok(self)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| EngineError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Aux link settings, when an aux engine is configured
    pub fn aux_link(&self) -> Option<AuxLinkConfig> {
        let path = self.aux.socket_path.as_ref()?;
        let mut link = AuxLinkConfig::new(path)
            .max_in_flight(self.aux.max_in_flight)
            .reconnect_delay(self.aux.reconnect_delay)
            .max_payload(self.transport.max_payload_size);
        link.connect_timeout = self.aux.connect_timeout;
        Some(link)
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.aux.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());

        if let Some(aux_path) = &self.aux.socket_path {
            if aux_path == &self.server.socket_path {
                errors.push(format!(
                    "Aux socket path must differ from the listening socket: '{}'",
                    aux_path.display()
                ));
            }
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        EngineError::ConfigError(format!("Invalid value for {ENV_PREFIX}{name}: '{value}'"))
    })
}

/// Listening socket configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket the daemon listens on
    pub socket_path: PathBuf,

    /// File mode applied to the socket after binding
    pub socket_mode: u32,

    /// Maximum number of concurrent client connections
    pub max_connections: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: 0o666,
            max_connections: 64,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Settings for a listener bound at `socket_path`
    pub fn at(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.socket_path.as_os_str().is_empty() {
            errors.push("Server socket path cannot be empty".to_string());
        }

        if self.socket_mode > 0o777 {
            errors.push(format!(
                "Invalid socket mode: {:o} (expected permission bits only)",
                self.socket_mode
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 4096 {
            errors.push(format!(
                "Max connections very high: {} (maximum: 4096)",
                self.max_connections
            ));
        }

        if self.shutdown_timeout.as_millis() < 100 {
            errors.push("Shutdown timeout too short (minimum: 100ms)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Which peers are privileged
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccessConfig {
    pub privileged_uids: Vec<u32>,
    pub privileged_gids: Vec<u32>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        let policy = TrustPolicy::root_only();
        Self {
            privileged_uids: policy.privileged_uids,
            privileged_gids: policy.privileged_gids,
        }
    }
}

impl AccessConfig {
    pub fn policy(&self) -> TrustPolicy {
        TrustPolicy {
            privileged_uids: self.privileged_uids.clone(),
            privileged_gids: self.privileged_gids.clone(),
        }
    }
}

/// Aux engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuxConfig {
    /// Socket of the aux engine; `None` disables forwarding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// How long a forwarded request may wait for its reply
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Correlation ids allowed in flight on the link
    pub max_in_flight: usize,

    /// Delay between reconnect attempts
    #[serde(with = "duration_serde")]
    pub reconnect_delay: Duration,

    /// Timeout for establishing the socket connection
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for AuxConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            request_timeout: timeout::AUX_REQUEST_TIMEOUT,
            max_in_flight: 4,
            reconnect_delay: timeout::AUX_RECONNECT_DELAY,
            connect_timeout: timeout::AUX_CONNECT_TIMEOUT,
        }
    }
}

impl AuxConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(path) = &self.socket_path {
            if path.as_os_str().is_empty() {
                errors.push("Aux socket path cannot be empty when set".to_string());
            }
        }

        if self.request_timeout.as_millis() < 10 {
            errors.push("Aux request timeout too short (minimum: 10ms)".to_string());
        } else if self.request_timeout.as_secs() > 60 {
            errors.push("Aux request timeout too long (maximum: 60s)".to_string());
        }

        if self.max_in_flight == 0 {
            errors.push("Aux max in-flight must be greater than 0".to_string());
        } else if self.max_in_flight > 1024 {
            errors.push(format!(
                "Aux max in-flight too large: {} (maximum: 1024)",
                self.max_in_flight
            ));
        }

        if self.reconnect_delay.as_millis() < 10 {
            errors.push("Aux reconnect delay too short (minimum: 10ms)".to_string());
        } else if self.reconnect_delay.as_secs() > 60 {
            errors.push("Aux reconnect delay too long (maximum: 60s)".to_string());
        }

        if self.connect_timeout.as_millis() < 10 {
            errors.push("Aux connect timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Hard maximum for request payloads and response results in bytes
    pub max_payload_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload_size < 16 {
            errors.push("Max payload size too small (minimum: 16 bytes)".to_string());
        } else if self.max_payload_size > PAYLOAD_LEN_LIMIT {
            errors.push(format!(
                "Max payload size too large: {} bytes (the length field allows {PAYLOAD_LEN_LIMIT})",
                self.max_payload_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("diagd"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
