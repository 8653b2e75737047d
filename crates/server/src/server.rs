//! HTTP server configuration and startup

use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use ltp_core::ServiceConfig;
use ltp_price_feed::{
    AggregatorConfig, KrakenClient, KrakenConfig, PriceAggregator, PriceCache, SymbolMapper,
};

use crate::handlers::{self, AppState};
use crate::middleware::log_requests;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ltp_core::DEFAULT_HOST.to_string(),
            port: ltp_core::DEFAULT_PORT,
        }
    }
}

impl From<&ServiceConfig> for ServerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Build the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/ltp", get(handlers::get_ltp))
        .route("/healthz", get(handlers::health))
        .route("/readyz", get(handlers::ready))
        .layer(axum::middleware::from_fn(log_requests))
        .with_state(state)
}

/// Wire cache, Kraken client and aggregator from configuration
pub fn build_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let mapper = Arc::new(SymbolMapper::kraken().clone());
    let cache = Arc::new(PriceCache::new(config.cache_ttl));
    let client = KrakenClient::with_mapper(KrakenConfig::from(config), Arc::clone(&mapper))?;

    let aggregator = PriceAggregator::new(
        AggregatorConfig::from(config),
        cache,
        mapper,
        Arc::new(client),
    );

    Ok(AppState::new(Arc::new(aggregator)))
}

/// HTTP server wrapper
pub struct LtpServer {
    config: ServerConfig,
    state: AppState,
}

impl LtpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.address()).await?;

        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped accepting connections");
        Ok(())
    }

    /// Get server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// If a handler cannot be installed the error is logged and that signal is
/// never observed; the other one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
