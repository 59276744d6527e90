//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! relay + http layers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a request via the trace span
//! - Metrics are cheap (atomic increments) and free when disabled

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
