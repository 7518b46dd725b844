//! Response status codes.
//!
//! The set is closed: a peer sending any other value has produced a corrupt
//! frame, see [`FrameError::UnknownStatus`].

use crate::error::FrameError;
use std::fmt;

/// Base wire value for handler-reported failures; the low byte is the code.
const HANDLER_FAILURE_BASE: u16 = 0x0100;

/// Outcome of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    InvalidCommand,
    InvalidLength,
    AccessDenied,
    /// A local handler ran and reported a failure with its own code.
    HandlerFailure(u8),
    AuxUnreachable,
    AuxTimeout,
    InternalError,
}

impl StatusCode {
    /// Wire representation.
    pub const fn to_wire(self) -> u16 {
        match self {
            StatusCode::Success => 0x0000,
            StatusCode::InvalidCommand => 0x0001,
            StatusCode::InvalidLength => 0x0002,
            StatusCode::AccessDenied => 0x0003,
            StatusCode::AuxUnreachable => 0x0004,
            StatusCode::AuxTimeout => 0x0005,
            StatusCode::InternalError => 0x0006,
            StatusCode::HandlerFailure(code) => HANDLER_FAILURE_BASE | code as u16,
        }
    }

    /// Parse a wire value.
    pub fn from_wire(raw: u16) -> Result<Self, FrameError> {
        let status = match raw {
            0x0000 => StatusCode::Success,
            0x0001 => StatusCode::InvalidCommand,
            0x0002 => StatusCode::InvalidLength,
            0x0003 => StatusCode::AccessDenied,
            0x0004 => StatusCode::AuxUnreachable,
            0x0005 => StatusCode::AuxTimeout,
            0x0006 => StatusCode::InternalError,
            v if v & 0xFF00 == HANDLER_FAILURE_BASE => StatusCode::HandlerFailure((v & 0x00FF) as u8),
            other => return Err(FrameError::UnknownStatus(other)),
        };
        Ok(status)
    }

    pub const fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Success => f.write_str("success"),
            StatusCode::InvalidCommand => f.write_str("invalid command"),
            StatusCode::InvalidLength => f.write_str("invalid length"),
            StatusCode::AccessDenied => f.write_str("access denied"),
            StatusCode::HandlerFailure(code) => write!(f, "handler failure (code {code})"),
            StatusCode::AuxUnreachable => f.write_str("aux engine unreachable"),
            StatusCode::AuxTimeout => f.write_str("aux engine timeout"),
            StatusCode::InternalError => f.write_str("internal error"),
        }
    }
}
