//! Error types

use thiserror::Error;

use crate::{Pair, Symbol};

/// Errors surfaced by a price aggregation request.
///
/// Every variant is terminal for the whole request: no partial responses.
#[derive(Debug, Error)]
pub enum LtpError {
    #[error("unsupported pair: {0}")]
    UnsupportedPair(Pair),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    #[error("upstream missing price for symbol {0}")]
    UpstreamMissingPrice(Symbol),

    #[error("failed to obtain price for {0}")]
    InternalInconsistency(Pair),
}

impl LtpError {
    /// True when the caller sent bad input rather than the upstream failing
    pub fn is_client_error(&self) -> bool {
        matches!(self, LtpError::UnsupportedPair(_))
    }

    /// True for failures caused by the upstream price source
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            LtpError::UpstreamUnavailable(_) | LtpError::UpstreamMissingPrice(_)
        )
    }
}

/// Upstream price source errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("upstream error: {0}")]
    Api(String),

    #[error("invalid price for {symbol}: {raw:?}")]
    InvalidPrice { symbol: Symbol, raw: String },

    #[error("timed out waiting for upstream")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

/// Result type alias
pub type LtpResult<T> = Result<T, LtpError>;
pub type UpstreamResult<T> = Result<T, UpstreamError>;
