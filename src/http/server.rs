//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router sending every path and method to the relay
//! - Wire up middleware (request ID, tracing)
//! - Serve over plain TCP or TLS
//! - Swap in a new relay when the configuration is reloaded
//! - Drain open streams on shutdown, bounded by a deadline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::http::request::{make_request_span, MakeRequestUuid, X_REQUEST_ID};
use crate::net::StreamTracker;
use crate::relay::StreamRelay;

/// How long open audio streams may keep the server alive after shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long connections get to finish once their streams have been ended.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<ArcSwap<StreamRelay>>,
}

impl AppState {
    /// The relay serving new requests.
    pub fn relay(&self) -> Arc<StreamRelay> {
        self.relay.load_full()
    }
}

/// HTTP server for the stream relay.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: RelayConfig,
    tracker: StreamTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let tracker = StreamTracker::new();
        let relay = StreamRelay::from_config(&config, tracker.clone())?;

        let state = AppState {
            relay: Arc::new(ArcSwap::from_pointee(relay)),
        };

        let router = Self::build_router(state.clone());
        Ok(Self {
            router,
            state,
            config,
            tracker,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID));

        Router::new()
            .route("/", any(relay_handler))
            .route("/{*path}", any(relay_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// The router, for serving it elsewhere or driving it directly.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Counter of relayed streams still open.
    pub fn tracker(&self) -> &StreamTracker {
        &self.tracker
    }

    /// Run the server on a plain TCP listener until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<RelayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.state.relay().upstream().url(),
            "HTTP server starting"
        );

        let reload = tokio::spawn(apply_config_updates(
            self.state.clone(),
            self.tracker.clone(),
            config_updates,
        ));

        let router = self.router;
        let mut drain = shutdown.resubscribe();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                    tracing::info!("Shutdown signal received");
                })
                .await
        });

        let result = tokio::select! {
            joined = &mut server => Some(joined),
            _ = drain.recv() => None,
        };

        let result = match result {
            Some(joined) => joined,
            None => match tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(
                        open_streams = self.tracker.active_count(),
                        "Drain deadline passed, closing open streams"
                    );
                    self.tracker.close_all();
                    match tokio::time::timeout(CLOSE_TIMEOUT, &mut server).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            tracing::error!(
                                open_streams = self.tracker.active_count(),
                                "Connections still open after closing streams, aborting"
                            );
                            server.abort();
                            Ok(Ok(()))
                        }
                    }
                }
            },
        };

        reload.abort();
        result.map_err(std::io::Error::other)??;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<RelayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            upstream = %self.state.relay().upstream().url(),
            "HTTPS server starting"
        );

        let reload = tokio::spawn(apply_config_updates(
            self.state.clone(),
            self.tracker.clone(),
            config_updates,
        ));

        let handle = axum_server::Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            signal.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        let result = axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await;

        reload.abort();
        result?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Replace the relay for every valid configuration received.
///
/// Requests already in flight keep the relay they started with.
async fn apply_config_updates(
    state: AppState,
    tracker: StreamTracker,
    mut updates: mpsc::UnboundedReceiver<RelayConfig>,
) {
    while let Some(config) = updates.recv().await {
        match StreamRelay::from_config(&config, tracker.clone()) {
            Ok(relay) => {
                tracing::info!(upstream = %relay.upstream().url(), "Configuration reloaded");
                state.relay.store(Arc::new(relay));
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected reloaded configuration");
            }
        }
    }
}

/// Every path and method lands here.
async fn relay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.relay().handle(request).await
}
