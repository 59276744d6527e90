//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Relay request to upstream:
//!     → timeouts.rs (deadline on upstream response headers)
//!     → On connect failure: retries.rs (opt-in, bounded, backoff.rs delays)
//! ```
//!
//! # Design Decisions
//! - Off by default: the relay is transparent, not resilient
//! - Upstream statuses are never retried, they are relayed
//! - No circuit breaking; each request stands alone

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{is_retryable_error, RetryPolicy};
pub use timeouts::{with_timeout, Elapsed};
