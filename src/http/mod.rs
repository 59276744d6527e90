//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, any path, any method)
//!     → request.rs (request ID, trace span)
//!     → relay (pre-flight answer or upstream pass-through)
//!     → headers.rs (CORS, hop-by-hop)
//!     → Send to client
//! ```

pub mod headers;
pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
