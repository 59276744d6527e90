//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake, rustls)
//!     → Hand off to HTTP layer
//!
//! Relayed body
//!     → connection.rs (stream guard, open-stream count)
//!     → dropped when the client goes away or upstream ends
//! ```

pub mod connection;
pub mod tls;

pub use connection::{StreamGuard, StreamId, StreamTracker};
