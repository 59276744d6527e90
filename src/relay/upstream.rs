//! Outbound client for the upstream stream.
//!
//! # Design Decisions
//! - Always a bare `GET`: nothing from the inbound request is forwarded
//! - No idle connection pool; every relay call opens its own connection
//! - No decompression; bytes reach the caller exactly as upstream sent them
//! - Deadline covers response headers only, never the body

use std::time::Duration;

use url::Url;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::observability::metrics;
use crate::resilience::{is_retryable_error, with_timeout, Elapsed, RetryPolicy};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Client bound to a single upstream URL.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    url: Url,
    response_timeout: Duration,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let url = Url::parse(&config.upstream.url)?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.upstream.connect_timeout_secs))
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .map_err(RelayError::Client)?;

        Ok(Self {
            client,
            url,
            response_timeout: Duration::from_secs(config.upstream.response_timeout_secs),
            retry: RetryPolicy::from_config(&config.retries),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request the stream. Resolves once upstream has sent its status and
    /// headers; the body is left unread.
    pub async fn fetch(&self) -> Result<reqwest::Response, RelayError> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let send = self.client.get(self.url.clone()).send();

            let error = match with_timeout(self.response_timeout, send).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(Elapsed(after)) => {
                    metrics::record_upstream_error("timeout");
                    return Err(RelayError::Timeout(after));
                }
            };

            if is_retryable_error(&error) {
                if let Some(delay) = self.retry.next_delay(attempts) {
                    tracing::warn!(
                        upstream = %self.url,
                        attempt = attempts,
                        delay = ?delay,
                        error = %error,
                        "Upstream connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            metrics::record_upstream_error(if error.is_connect() { "connect" } else { "request" });
            return Err(RelayError::Upstream(error));
        }
    }
}
