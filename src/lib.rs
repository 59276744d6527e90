//! Audio stream relay with permissive cross-origin headers.
//!
//! Relays one upstream internet radio stream byte-for-byte so browser audio
//! players on any origin can play it.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser                 ┌──────────────────────────────────────────┐
//!     ───── OPTIONS ─────────▶│ http::server ─▶ relay ── 204 + CORS      │
//!                             │                                          │
//!     ───── GET ─────────────▶│ http::server ─▶ relay ─▶ upstream ───────┼──▶ Stream
//!     ◀──── audio/mpeg ───────│   CORS header ◀─ guarded body ◀──────────┼─── source
//!                             │                                          │
//!                             │  config · observability · resilience     │
//!                             │  lifecycle · net (tls, stream tracking)  │
//!                             └──────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod resilience;

pub use config::RelayConfig;
pub use error::RelayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::StreamRelay;
