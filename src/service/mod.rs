//! # Service Layer
//!
//! Wires configuration, the handler registry, the engine core and both
//! transports into a runnable [`Daemon`](daemon::Daemon).

pub mod daemon;

pub use daemon::Daemon;
