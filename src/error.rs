//! Relay error type.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::headers;

/// Everything that can stop a relay request from producing upstream's response.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Upstream could not be reached or the request failed before any response.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),

    /// Upstream accepted the connection but sent no response headers in time.
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RelayError {
    /// Status returned to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::InvalidUrl(_) | RelayError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Empty body with the status; the allow-origin header keeps the failure
/// visible to cross-origin players.
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        headers::allow_any_origin(response.headers_mut());
        response
    }
}
