//! Access control.
//!
//! The granted tier of a caller is derived from the credentials of its
//! socket, never from anything the client put in the frame.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::status::StatusCode;
use crate::protocol::registry::HandlerRegistry;

/// Tier required by a command, or granted to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    /// Firmware writes, resets, persistent configuration changes.
    Privileged,
}

/// Transport-level identity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallerIdentity {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub pid: Option<i32>,
}

impl CallerIdentity {
    pub fn new(uid: u32, gid: u32, pid: Option<i32>) -> Self {
        Self {
            uid: Some(uid),
            gid: Some(gid),
            pid,
        }
    }

    /// A peer whose credentials could not be read.
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[cfg(unix)]
    pub fn from_ucred(cred: &tokio::net::unix::UCred) -> Self {
        Self::new(cred.uid(), cred.gid(), cred.pid())
    }
}

/// Maps peer credentials to an access tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPolicy {
    #[serde(default)]
    pub privileged_uids: Vec<u32>,
    #[serde(default)]
    pub privileged_gids: Vec<u32>,
}

impl TrustPolicy {
    /// Only root is privileged.
    pub fn root_only() -> Self {
        Self {
            privileged_uids: vec![0],
            privileged_gids: Vec::new(),
        }
    }

    pub fn granted_level(&self, caller: &CallerIdentity) -> AccessLevel {
        let uid_trusted = caller
            .uid
            .is_some_and(|uid| self.privileged_uids.contains(&uid));
        let gid_trusted = caller
            .gid
            .is_some_and(|gid| self.privileged_gids.contains(&gid));
        if uid_trusted || gid_trusted {
            AccessLevel::Privileged
        } else {
            AccessLevel::Public
        }
    }
}

/// Authorises a request before any length check, handler or forward.
#[derive(Debug, Clone)]
pub struct AccessGate {
    policy: TrustPolicy,
    registry: Arc<HandlerRegistry>,
}

impl AccessGate {
    pub fn new(policy: TrustPolicy, registry: Arc<HandlerRegistry>) -> Self {
        Self { policy, registry }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Returns the caller's granted level when it covers the command.
    ///
    /// Unknown commands are denied.
    pub fn authorize(
        &self,
        command_id: u16,
        caller: &CallerIdentity,
    ) -> Result<AccessLevel, StatusCode> {
        let required = self
            .registry
            .lookup(command_id)
            .map(|entry| entry.access_level)
            .map_err(|_| StatusCode::AccessDenied)?;
        let granted = self.policy.granted_level(caller);
        if granted >= required {
            Ok(granted)
        } else {
            debug!(
                command_id,
                uid = ?caller.uid,
                ?required,
                ?granted,
                "Access denied"
            );
            Err(StatusCode::AccessDenied)
        }
    }
}
