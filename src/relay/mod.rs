//! Stream relay.
//!
//! One linear request/response cycle per call, with one branch:
//!
//! ```text
//! OPTIONS  → 204 + allow-origin/methods/headers, upstream untouched
//! anything → GET upstream
//!          → upstream status + headers (hop-by-hop stripped)
//!          → Access-Control-Allow-Origin: * (overwrites)
//!          → upstream body streamed through, unbuffered
//! ```
//!
//! Upstream error statuses are relayed like any other status. Only a failure
//! to get a response at all becomes a 502/504 from the relay.

pub mod body;
pub mod upstream;

use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::http::headers;
use crate::net::StreamTracker;
use crate::observability::metrics;

pub use body::guarded_body;
pub use upstream::UpstreamClient;

/// Relays inbound requests to one upstream audio stream.
#[derive(Debug, Clone)]
pub struct StreamRelay {
    upstream: UpstreamClient,
    tracker: StreamTracker,
}

impl StreamRelay {
    pub fn new(upstream: UpstreamClient, tracker: StreamTracker) -> Self {
        Self { upstream, tracker }
    }

    pub fn from_config(config: &RelayConfig, tracker: StreamTracker) -> Result<Self, RelayError> {
        Ok(Self::new(UpstreamClient::from_config(config)?, tracker))
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn tracker(&self) -> &StreamTracker {
        &self.tracker
    }

    /// Handle one inbound request.
    ///
    /// Only the method is consulted. Upstream failures come back as error
    /// responses, never as a hang or an empty 200.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        if request.method() == Method::OPTIONS {
            metrics::record_preflight();
            tracing::debug!("Answered pre-flight request");
            return headers::preflight_response();
        }

        let method = request.method().clone();
        drop(request);

        match self.relay().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    method = %method,
                    upstream = %self.upstream.url(),
                    error = %e,
                    "Upstream request failed"
                );
                e.into_response()
            }
        }
    }

    async fn relay(&self) -> Result<Response, RelayError> {
        let start = Instant::now();
        let upstream = self.upstream.fetch().await?;

        let status = upstream.status();
        metrics::record_relay(status.as_u16(), start);

        let mut upstream_headers = upstream.headers().clone();
        headers::strip_hop_by_hop(&mut upstream_headers);
        headers::allow_any_origin(&mut upstream_headers);

        let guard = self.tracker.track();
        tracing::info!(
            stream_id = %guard.id(),
            status = status.as_u16(),
            content_type = ?upstream_headers.get(axum::http::header::CONTENT_TYPE),
            ttfb = ?start.elapsed(),
            "Relaying upstream response"
        );

        let mut response = Response::new(guarded_body(upstream.bytes_stream(), guard));
        *response.status_mut() = status;
        *response.headers_mut() = upstream_headers;
        Ok(response)
    }
}
