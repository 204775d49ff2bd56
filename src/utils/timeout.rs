//! Deadline helpers for transport-level operations.
//!
//! The RPC protocol has no timeouts of its own. These wrappers exist for the
//! transport layer (connecting, spawning helpers) where callers want bounded
//! latency.

use crate::error::{Result, RpcError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default deadline for establishing a connection
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for connections to drain when a server shuts down
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut` and turn an expired deadline into `RpcError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = duration.as_millis() as u64, "Operation timed out");
            Err(RpcError::Timeout)
        }
    }
}
