//! # Utility Modules
//!
//! Supporting pieces shared by the listener, the engine and the aux link.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by `LoggingConfig`
//! - **Metrics**: atomic counters for connections and request outcomes
//! - **Timeout**: default durations and async deadline wrappers

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use logging::{init_logging, LoggingHandle};
pub use metrics::{Metrics, MetricsSnapshot};
