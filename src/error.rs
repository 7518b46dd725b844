//! # Error Types
//!
//! Error handling for the diagnostics engine.
//!
//! Three families live here, split by who is allowed to see them:
//! - [`FrameError`]: wire-level corruption. Fatal to the connection (or aux
//!   session) that produced it; the stream has no resynchronisation point.
//! - [`RegistryError`]: handler-table misconfiguration. Fatal at startup, never
//!   raised while requests are being served.
//! - [`EngineError`]: the crate error for setup, I/O and configuration paths.
//!
//! Per-request outcomes (unknown command, access denied, aux timeout, ...) are
//! *not* errors: they are [`StatusCode`](crate::core::status::StatusCode) values
//! carried in an ordinary response.
//!
//! ## Example Usage
//! ```rust
//! use diag_engine::error::{EngineError, Result};
//!
//! fn load(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).map_err(EngineError::Io)
//! }
//!
//! assert!(load("/definitely/not/here").is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants shared by log lines and error payloads.
pub mod constants {
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_AUX_NOT_CONFIGURED: &str = "No aux link configured for forwarded command";
    pub const ERR_AUX_LINK_DOWN: &str = "Aux link is down";
    pub const ERR_HANDLER_PANICKED: &str = "Handler panicked";
    pub const ERR_RESULT_TOO_LARGE: &str = "Handler result exceeds frame limit";
}

/// Wire framing failures.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Fewer bytes are available than the header (or declared payload) needs.
    #[error("Truncated frame: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    /// The declared length exceeds the configured hard maximum.
    #[error("Oversized frame: declared {declared} bytes, maximum is {max}")]
    Oversize { declared: usize, max: usize },

    /// A response carried a status value outside the closed set.
    #[error("Unknown status code 0x{0:04x}")]
    UnknownStatus(u16),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Layer a registry entry was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Common,
    Platform,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Common => f.write_str("common"),
            Layer::Platform => f.write_str("platform"),
        }
    }
}

/// Startup-time handler table errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Command 0x{command_id:04x} registered twice in the {layer} table")]
    Duplicate { command_id: u16, layer: Layer },

    #[error("Platform command 0x{0:04x} collides with a common command without being declared as an override")]
    UndeclaredOverride(u16),

    #[error("Platform override for command 0x{0:04x} has no common entry to replace")]
    OverrideWithoutTarget(u16),

    #[error("Command 0x{command_id:04x} has invalid payload bounds [{min_len}, {max_len}]")]
    InvalidBounds {
        command_id: u16,
        min_len: u16,
        max_len: u16,
    },

    #[error("Command 0x{command_id:04x} needs at least {min_len} bytes but frames carry at most {limit}")]
    UnsatisfiableBounds {
        command_id: u16,
        min_len: u16,
        limit: usize,
    },
}

/// Crate error for setup, transport and configuration paths.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Timeout occurred")]
    Timeout,
}

/// Type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
