//! Commands every engine answers regardless of platform.

use crate::protocol::registry::HandlerEntry;

/// Echoes its payload; used for liveness checks and aux-link probing.
pub const CMD_PING: u16 = 0x0001;

/// Returns the engine version string.
pub const CMD_VERSION: u16 = 0x0002;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The common-layer entries owned by the engine itself.
pub fn common_table() -> Vec<HandlerEntry> {
    vec![
        HandlerEntry::local(CMD_PING, "ping", |payload| Ok(payload.to_vec())),
        HandlerEntry::local(CMD_VERSION, "version", |_| {
            Ok(ENGINE_VERSION.as_bytes().to_vec())
        })
        .payload_len(0, 0),
    ]
}
