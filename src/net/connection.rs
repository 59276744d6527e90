//! Relayed stream lifecycle tracking.
//!
//! Every relayed body carries a [`StreamGuard`]. The guard lives exactly as
//! long as the body: when the client disconnects the server drops the body,
//! the guard drops with it and so does the upstream byte stream.
//!
//! [`StreamTracker::close_all`] ends every open body from the server side,
//! which is how shutdown stops live streams that would otherwise never end.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::observability::metrics;

/// Relaxed ordering is enough; IDs only need to be unique.
static STREAM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a relayed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    pub fn new() -> Self {
        Self(STREAM_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Counts relayed streams that are still open.
///
/// Cloning shares the counter and the close signal.
#[derive(Debug, Clone, Default)]
pub struct StreamTracker {
    active_count: Arc<AtomicU64>,
    closing: Arc<watch::Sender<bool>>,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new open stream. Returns a guard that decrements on drop.
    pub fn track(&self) -> StreamGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_streams(active);

        let id = StreamId::new();
        tracing::debug!(stream_id = %id, active, "Stream opened");

        StreamGuard {
            active_count: Arc::clone(&self.active_count),
            closing: self.closing.subscribe(),
            id,
            opened_at: Instant::now(),
            bytes: 0,
        }
    }

    /// Number of relayed bodies currently open.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every open stream has closed, or `deadline` passes.
    ///
    /// Returns `true` if all streams closed in time.
    pub async fn wait_idle(&self, deadline: Duration) -> bool {
        let give_up = Instant::now() + deadline;
        while self.active_count() > 0 {
            if Instant::now() >= give_up {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    /// End every open stream, and every stream opened afterwards.
    pub fn close_all(&self) {
        self.closing.send_replace(true);
    }
}

/// Guard that tracks one relayed stream's lifetime.
#[derive(Debug)]
pub struct StreamGuard {
    active_count: Arc<AtomicU64>,
    closing: watch::Receiver<bool>,
    id: StreamId,
    opened_at: Instant,
    bytes: u64,
}

impl StreamGuard {
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Account for a chunk passed through to the client.
    pub fn add_bytes(&mut self, len: usize) {
        self.bytes += len as u64;
        metrics::record_streamed_bytes(len as u64);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Resolves once [`StreamTracker::close_all`] has been called.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closing = self.closing.clone();
        async move {
            // A dropped tracker never closes its streams.
            if closing.wait_for(|closed| *closed).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_streams(active);
        tracing::info!(
            stream_id = %self.id,
            bytes = self.bytes,
            duration = ?self.opened_at.elapsed(),
            "Stream closed"
        );
    }
}
