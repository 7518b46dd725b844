//! Timing defaults and deadline helpers.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{EngineError, Result};

/// Default wait for an aux engine reply.
pub const AUX_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between aux link reconnect attempts.
pub const AUX_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on establishing the aux socket connection.
pub const AUX_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// How long shutdown waits for open connections to drain.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while draining connections at shutdown.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run `fut`, failing with [`EngineError::Timeout`] after `duration`.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| EngineError::Timeout)
}

/// Like [`with_timeout`] but against an absolute deadline shared by several
/// steps of one operation.
pub async fn until_deadline<F, T>(deadline: Instant, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| EngineError::Timeout)
}
