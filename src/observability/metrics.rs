//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by kind (preflight/relay) and status
//! - `relay_upstream_errors_total` (counter): failed upstream calls by kind
//! - `relay_upstream_ttfb_seconds` (histogram): time until upstream headers
//! - `relay_active_streams` (gauge): relayed bodies currently open
//! - `relay_streamed_bytes_total` (counter): audio bytes passed through
//!
//! Recording is a no-op until `init_metrics` installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_preflight() {
    counter!("relay_requests_total", "kind" => "preflight", "status" => "204").increment(1);
}

/// Record a relayed upstream response and its time to first byte.
pub fn record_relay(status: u16, start: Instant) {
    counter!("relay_requests_total", "kind" => "relay", "status" => status.to_string())
        .increment(1);
    histogram!("relay_upstream_ttfb_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("relay_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn set_active_streams(count: u64) {
    gauge!("relay_active_streams").set(count as f64);
}

pub fn record_streamed_bytes(bytes: u64) {
    counter!("relay_streamed_bytes_total").increment(bytes);
}
