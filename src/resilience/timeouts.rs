//! Timeout enforcement.
//!
//! Only the wait for upstream response headers has a deadline here. The
//! relayed body is open-ended.

use std::future::Future;
use std::time::Duration;

/// Marker error for an elapsed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `future` with a deadline.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| Elapsed(duration))
}
