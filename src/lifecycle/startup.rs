//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Metrics before listeners; listeners start last (traffic only when ready)

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;
use crate::observability::metrics;

/// Start every subsystem for a validated `config` and serve until `shutdown`.
pub async fn start(
    config: RelayConfig,
    config_updates: mpsc::UnboundedReceiver<RelayConfig>,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let bind_address = config.listener.bind_address.clone();
    let tls = config.listener.tls.clone();
    let server = HttpServer::new(config)?;

    match tls {
        Some(tls) => {
            let addr: SocketAddr = bind_address.parse()?;
            let rustls = load_tls_config(&tls).await?;
            server
                .run_tls(addr, rustls, config_updates, shutdown.subscribe())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            server
                .run(listener, config_updates, shutdown.subscribe())
                .await?;
        }
    }

    Ok(())
}
