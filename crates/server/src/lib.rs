//! HTTP API for last traded prices
//!
//! Thin boundary over the price aggregator: query parsing, status mapping
//! and request logging.

pub mod handlers;
pub mod middleware;
pub mod server;

pub use handlers::{AppState, ApiError};
pub use server::{build_state, create_router, shutdown_signal, LtpServer, ServerConfig};
