//! Handler registry.
//!
//! The table is assembled once at startup from a common layer and a platform
//! layer, then frozen. Lookups are exact matches on the command id and need no
//! locking because nothing can mutate the map after [`RegistryBuilder::build`].

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::core::frame::MAX_PAYLOAD_SIZE;
use crate::core::status::StatusCode;
use crate::error::{Layer, RegistryError};
use crate::protocol::access::AccessLevel;

/// Failure reported by a local handler; becomes `HandlerFailure(code)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} (code {code})")]
pub struct HandlerError {
    pub code: u8,
    pub reason: Cow<'static, str>,
}

impl HandlerError {
    pub fn new(code: u8) -> Self {
        Self {
            code,
            reason: Cow::Borrowed("handler failed"),
        }
    }

    pub fn with_reason(code: u8, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A diagnostic handler: validated payload in, result bytes out.
///
/// Handlers may block on hardware but must return.
pub type HandlerFn = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, HandlerError> + Send + Sync + 'static>;

/// Where a command executes.
#[derive(Clone)]
pub enum Dispatch {
    Local(HandlerFn),
    /// Owned by the aux engine; relayed over the aux link.
    Forwarded,
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Local(_) => f.write_str("Local(..)"),
            Dispatch::Forwarded => f.write_str("Forwarded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerEntry {
    pub command_id: u16,
    pub name: Cow<'static, str>,
    pub access_level: AccessLevel,
    pub min_len: u16,
    pub max_len: u16,
    pub dispatch: Dispatch,
}

impl HandlerEntry {
    /// A public local command accepting any payload up to the frame limit.
    pub fn local<F>(command_id: u16, name: impl Into<Cow<'static, str>>, handler: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, HandlerError> + Send + Sync + 'static,
    {
        Self {
            command_id,
            name: name.into(),
            access_level: AccessLevel::Public,
            min_len: 0,
            max_len: u16::MAX,
            dispatch: Dispatch::Local(Arc::new(handler)),
        }
    }

    /// A public command executed by the aux engine.
    pub fn forwarded(command_id: u16, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            command_id,
            name: name.into(),
            access_level: AccessLevel::Public,
            min_len: 0,
            max_len: u16::MAX,
            dispatch: Dispatch::Forwarded,
        }
    }

    pub fn privileged(mut self) -> Self {
        self.access_level = AccessLevel::Privileged;
        self
    }

    /// Inclusive payload bounds.
    pub fn payload_len(mut self, min_len: u16, max_len: u16) -> Self {
        self.min_len = min_len;
        self.max_len = max_len;
        self
    }

    pub fn is_forwarded(&self) -> bool {
        matches!(self.dispatch, Dispatch::Forwarded)
    }

    pub fn accepts_len(&self, len: usize) -> bool {
        (self.min_len as usize..=self.max_len as usize).contains(&len)
    }
}

/// Frozen command table.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: HashMap<u16, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn lookup(&self, command_id: u16) -> Result<&HandlerEntry, StatusCode> {
        self.entries
            .get(&command_id)
            .ok_or(StatusCode::InvalidCommand)
    }

    pub fn validate_length(entry: &HandlerEntry, payload_len: usize) -> Result<(), StatusCode> {
        if entry.accepts_len(payload_len) {
            Ok(())
        } else {
            Err(StatusCode::InvalidLength)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered command ids in ascending order.
    pub fn command_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlatformKind {
    Addition,
    Override,
}

/// Collects the two layers and merges them.
#[derive(Debug)]
pub struct RegistryBuilder {
    common: Vec<HandlerEntry>,
    platform: Vec<(HandlerEntry, PlatformKind)>,
    frame_limit: usize,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            common: Vec::new(),
            platform: Vec::new(),
            frame_limit: MAX_PAYLOAD_SIZE,
        }
    }

    /// Upper bound applied to every entry's `max_len`.
    pub fn with_frame_limit(mut self, frame_limit: usize) -> Self {
        self.frame_limit = frame_limit;
        self
    }

    pub fn common(mut self, entry: HandlerEntry) -> Self {
        self.common.push(entry);
        self
    }

    pub fn common_table(mut self, entries: impl IntoIterator<Item = HandlerEntry>) -> Self {
        self.common.extend(entries);
        self
    }

    /// A platform-only command. Must not collide with a common command.
    pub fn platform(mut self, entry: HandlerEntry) -> Self {
        self.platform.push((entry, PlatformKind::Addition));
        self
    }

    /// A platform implementation replacing the common entry with the same id.
    pub fn platform_override(mut self, entry: HandlerEntry) -> Self {
        self.platform.push((entry, PlatformKind::Override));
        self
    }

    pub fn build(self) -> Result<HandlerRegistry, RegistryError> {
        let frame_limit = self.frame_limit;
        let mut entries = HashMap::with_capacity(self.common.len() + self.platform.len());

        for entry in self.common {
            let entry = clamp_bounds(entry, frame_limit)?;
            let command_id = entry.command_id;
            if entries.insert(command_id, entry).is_some() {
                return Err(RegistryError::Duplicate {
                    command_id,
                    layer: Layer::Common,
                });
            }
        }

        let mut seen = HashSet::with_capacity(self.platform.len());
        for (entry, kind) in self.platform {
            let entry = clamp_bounds(entry, frame_limit)?;
            let command_id = entry.command_id;
            if !seen.insert(command_id) {
                return Err(RegistryError::Duplicate {
                    command_id,
                    layer: Layer::Platform,
                });
            }
            match (kind, entries.contains_key(&command_id)) {
                (PlatformKind::Addition, true) => {
                    return Err(RegistryError::UndeclaredOverride(command_id))
                }
                (PlatformKind::Override, false) => {
                    return Err(RegistryError::OverrideWithoutTarget(command_id))
                }
                (PlatformKind::Override, true) => {
                    debug!(command_id, name = %entry.name, "Platform override");
                }
                (PlatformKind::Addition, false) => {}
            }
            entries.insert(command_id, entry);
        }

        let forwarded = entries.values().filter(|e| e.is_forwarded()).count();
        info!(
            commands = entries.len(),
            forwarded, "Handler registry built"
        );
        Ok(HandlerRegistry { entries })
    }
}

fn clamp_bounds(mut entry: HandlerEntry, frame_limit: usize) -> Result<HandlerEntry, RegistryError> {
    if entry.min_len > entry.max_len {
        return Err(RegistryError::InvalidBounds {
            command_id: entry.command_id,
            min_len: entry.min_len,
            max_len: entry.max_len,
        });
    }
    if entry.min_len as usize > frame_limit {
        return Err(RegistryError::UnsatisfiableBounds {
            command_id: entry.command_id,
            min_len: entry.min_len,
            limit: frame_limit,
        });
    }
    let limit = u16::try_from(frame_limit).unwrap_or(u16::MAX);
    entry.max_len = entry.max_len.min(limit);
    Ok(entry)
}
