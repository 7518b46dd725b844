//! Observability and Metrics
//!
//! Counters for the request pipeline, owned by the engine and shared with the
//! listener and aux link through an `Arc`.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use crate::core::status::StatusCode;

#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Connections refused at the connection limit
    pub connections_rejected: AtomicU64,
    /// Connections closed because of a framing error
    pub frame_errors: AtomicU64,
    /// Requests decoded and handled
    pub requests_total: AtomicU64,
    /// Requests run by a local handler
    pub requests_local: AtomicU64,
    /// Requests relayed to the aux engine
    pub requests_forwarded: AtomicU64,
    pub responses_success: AtomicU64,
    pub invalid_command: AtomicU64,
    pub invalid_length: AtomicU64,
    pub access_denied: AtomicU64,
    pub handler_failures: AtomicU64,
    pub aux_unreachable: AtomicU64,
    pub aux_timeouts: AtomicU64,
    pub internal_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
            requests_local: AtomicU64::new(0),
            requests_forwarded: AtomicU64::new(0),
            responses_success: AtomicU64::new(0),
            invalid_command: AtomicU64::new(0),
            invalid_length: AtomicU64::new(0),
            access_denied: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            aux_unreachable: AtomicU64::new(0),
            aux_timeouts: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_local(&self) {
        self.requests_local.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_forwarded(&self) {
        self.requests_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the final status of one handled request.
    pub fn record_outcome(&self, status: StatusCode) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            StatusCode::Success => &self.responses_success,
            StatusCode::InvalidCommand => &self.invalid_command,
            StatusCode::InvalidLength => &self.invalid_length,
            StatusCode::AccessDenied => &self.access_denied,
            StatusCode::HandlerFailure(_) => &self.handler_failures,
            StatusCode::AuxUnreachable => &self.aux_unreachable,
            StatusCode::AuxTimeout => &self.aux_timeouts,
            StatusCode::InternalError => &self.internal_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_local: self.requests_local.load(Ordering::Relaxed),
            requests_forwarded: self.requests_forwarded.load(Ordering::Relaxed),
            responses_success: self.responses_success.load(Ordering::Relaxed),
            invalid_command: self.invalid_command.load(Ordering::Relaxed),
            invalid_length: self.invalid_length.load(Ordering::Relaxed),
            access_denied: self.access_denied.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            aux_unreachable: self.aux_unreachable.load(Ordering::Relaxed),
            aux_timeouts: self.aux_timeouts.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            frame_errors = snapshot.frame_errors,
            requests_total = snapshot.requests_total,
            requests_local = snapshot.requests_local,
            requests_forwarded = snapshot.requests_forwarded,
            responses_success = snapshot.responses_success,
            invalid_command = snapshot.invalid_command,
            invalid_length = snapshot.invalid_length,
            access_denied = snapshot.access_denied,
            handler_failures = snapshot.handler_failures,
            aux_unreachable = snapshot.aux_unreachable,
            aux_timeouts = snapshot.aux_timeouts,
            internal_errors = snapshot.internal_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Engine metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub frame_errors: u64,
    pub requests_total: u64,
    pub requests_local: u64,
    pub requests_forwarded: u64,
    pub responses_success: u64,
    pub invalid_command: u64,
    pub invalid_length: u64,
    pub access_denied: u64,
    pub handler_failures: u64,
    pub aux_unreachable: u64,
    pub aux_timeouts: u64,
    pub internal_errors: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
