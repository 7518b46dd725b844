//! # Diag Engine
//!
//! Core of a diagnostics daemon for embedded network equipment. Local clients
//! send framed binary requests over a Unix socket; the engine checks the
//! caller's credentials, validates the payload length against the command's
//! declared bounds, and either runs a local handler or relays the request to
//! a chained aux engine.
//!
//! ## Layers
//! - [`core`]: frame layout, status codes, stream codecs
//! - [`protocol`]: handler registry, access control, the request pipeline
//! - [`transport`]: Unix socket listener and the aux link
//! - [`service`]: assembles everything into a runnable [`Daemon`]
//! - [`config`], [`error`], [`utils`]: configuration, error types, logging,
//!   metrics and timeouts
//!
//! ## Example
//! ```rust
//! use diag_engine::{CallerIdentity, EngineCore, Request, RegistryBuilder, StatusCode, TrustPolicy};
//! use diag_engine::protocol::builtin;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = RegistryBuilder::new()
//!     .common_table(builtin::common_table())
//!     .build()
//!     .unwrap();
//! let engine = EngineCore::new(registry, TrustPolicy::root_only());
//!
//! let caller = CallerIdentity::new(1000, 1000, None);
//! let response = engine
//!     .handle(Request::new(builtin::CMD_PING, 7, &b"hi"[..]), &caller)
//!     .await;
//! assert_eq!(response.status(), StatusCode::Success);
//! assert_eq!(response.sequence_id(), 7);
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::EngineConfig;
pub use crate::core::frame::{Request, Response};
pub use crate::core::status::StatusCode;
pub use crate::error::{EngineError, FrameError, RegistryError, Result};
pub use crate::protocol::access::{AccessLevel, CallerIdentity, TrustPolicy};
pub use crate::protocol::dispatcher::EngineCore;
pub use crate::protocol::registry::{HandlerEntry, HandlerError, HandlerRegistry, RegistryBuilder};
pub use crate::service::Daemon;
pub use crate::transport::aux::{AuxForwarder, AuxLink, AuxLinkConfig};
