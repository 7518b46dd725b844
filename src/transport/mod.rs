//! # Transport Layer
//!
//! - **local**: the Unix socket listener clients connect to, plus a framed
//!   client for tools and tests
//! - **aux**: the shared, multiplexed link to a chained aux engine
//!
//! Both speak the frame format in [`crate::core::frame`]; neither holds any
//! business logic.

pub mod aux;
pub mod local;

pub use aux::{AuxForwarder, AuxLink, AuxLinkConfig};
