//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the upstream URL is usable for a relay
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream.url is required")]
    MissingUpstreamUrl,

    #[error("upstream.url `{url}` is invalid: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    #[error("upstream.url scheme `{0}` is not http or https")]
    UnsupportedScheme(String),

    #[error("{field} `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("retries.base_delay_ms ({base}) exceeds retries.max_delay_ms ({max})")]
    BackoffRange { base: u64, max: u64 },

    #[error("listener.tls.{0} must not be empty")]
    EmptyTlsPath(&'static str),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_upstream_url(&config.upstream.url, &mut errors);

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert_path"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key_path"));
        }
    }

    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("upstream.connect_timeout_secs"));
    }
    if config.upstream.response_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("upstream.response_timeout_secs"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::ZeroValue("retries.max_attempts"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: retries.base_delay_ms,
            max: retries.max_delay_ms,
        });
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_upstream_url(raw: &str, errors: &mut Vec<ValidationError>) {
    if raw.trim().is_empty() {
        errors.push(ValidationError::MissingUpstreamUrl);
        return;
    }

    match Url::parse(raw) {
        Ok(url) => match url.scheme() {
            "http" | "https" => {}
            other => errors.push(ValidationError::UnsupportedScheme(other.to_string())),
        },
        Err(e) => errors.push(ValidationError::InvalidUpstreamUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}
