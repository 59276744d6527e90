//! Pass-through body for relayed streams.

use axum::body::{Body, Bytes};
use futures_util::{Stream, StreamExt};

use crate::net::StreamGuard;

/// Wrap an upstream byte stream as a response body without buffering it.
///
/// `guard` is owned by the body and released when the body is dropped. The
/// body ends early once the guard's tracker closes all streams.
pub fn guarded_body<S, E>(stream: S, mut guard: StreamGuard) -> Body
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let closed = guard.closed();
    let stream = stream.map(move |chunk| {
        match &chunk {
            Ok(bytes) => guard.add_bytes(bytes.len()),
            Err(e) => tracing::warn!(
                stream_id = %guard.id(),
                bytes = guard.bytes(),
                error = %e,
                "Upstream stream failed"
            ),
        }
        chunk
    });
    Body::from_stream(stream.take_until(closed))
}
