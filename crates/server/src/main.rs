//! LTP service
//!
//! Main entry point for the HTTP server

use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ltp_core::ServiceConfig;
use ltp_server::{build_state, shutdown_signal, LtpServer, ServerConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting LTP service v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::from_env()?;
    info!(
        cache_ttl = ?config.cache_ttl,
        http_timeout = ?config.http_timeout,
        upstream = %config.kraken_base_url,
        "Configuration loaded"
    );

    let state = build_state(&config)?;
    let server = LtpServer::new(ServerConfig::from(&config), state);

    info!("HTTP server starting on {}", server.address());

    if let Err(e) = server.start_with_shutdown(shutdown_signal()).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}
