//! # Request Pipeline
//!
//! Everything between a decoded request and its response.
//!
//! ## Components
//! - **Registry**: the frozen command table, merged from common and platform layers
//! - **Access**: peer-credential based authorisation
//! - **Dispatcher**: [`EngineCore`](dispatcher::EngineCore), which orders lookup,
//!   access check, length check and execution
//! - **Builtin**: commands the engine answers on every platform
//!
//! ## Ordering Guarantees
//! 1. Unknown commands are rejected before anything else
//! 2. Access control runs before length validation and before any forward
//! 3. Handlers only ever see payloads within their declared bounds

pub mod access;
pub mod builtin;
pub mod dispatcher;
pub mod registry;

#[cfg(test)]
mod tests;
