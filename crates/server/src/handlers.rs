//! HTTP request handlers.

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::error;

use ltp_core::{LtpError, LtpResponse, Pair};
use ltp_price_feed::PriceAggregator;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<PriceAggregator>,
}

impl AppState {
    pub fn new(aggregator: Arc<PriceAggregator>) -> Self {
        Self { aggregator }
    }
}

/// GET /api/v1/ltp - Last traded prices.
///
/// Pairs come from repeated `pair=` parameters and comma-separated `pairs=`;
/// with neither, every supported pair is returned.
pub async fn get_ltp(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let mapper = state.aggregator.mapper();

    let mut pairs = parse_pairs(query.as_deref());
    if pairs.is_empty() {
        pairs = mapper.supported_pairs().to_vec();
    }

    if let Some(pair) = pairs.iter().find(|p| !mapper.is_supported(p)) {
        return ApiError(LtpError::UnsupportedPair(pair.clone())).into_response();
    }

    match state.aggregator.get_prices(&pairs).await {
        Ok(entries) => (StatusCode::OK, Json(LtpResponse::new(entries))).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// GET /healthz - Liveness check.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /readyz - Readiness check.
pub async fn ready() -> StatusCode {
    StatusCode::OK
}

/// Extract requested pairs from a raw query string, `pair` values first.
pub fn parse_pairs(query: Option<&str>) -> Vec<Pair> {
    let Some(query) = query else {
        return Vec::new();
    };

    let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    let single = params
        .iter()
        .filter(|(key, _)| key == "pair")
        .map(|(_, value)| value.as_str());

    let csv = params
        .iter()
        .filter(|(key, _)| key == "pairs")
        .flat_map(|(_, value)| value.split(','));

    single
        .chain(csv)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Pair::from)
        .collect()
}

/// Maps aggregation failures onto HTTP responses
#[derive(Debug)]
pub struct ApiError(pub LtpError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            LtpError::UnsupportedPair(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
            }
            LtpError::UpstreamUnavailable(_) | LtpError::UpstreamMissingPrice(_) => {
                error!("Failed to fetch prices: {}", self.0);
                (StatusCode::BAD_GATEWAY, Json(LtpResponse::empty())).into_response()
            }
            LtpError::InternalInconsistency(_) => {
                error!("Price aggregation inconsistency: {}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(LtpResponse::empty())).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pairs: &[Pair]) -> Vec<&str> {
        pairs.iter().map(Pair::as_str).collect()
    }

    #[test]
    fn test_parse_no_query() {
        assert!(parse_pairs(None).is_empty());
        assert!(parse_pairs(Some("")).is_empty());
        assert!(parse_pairs(Some("pair=&pairs=,,")).is_empty());
    }

    #[test]
    fn test_parse_repeated_and_csv() {
        let pairs = parse_pairs(Some("pairs=BTC/CHF,%20BTC%2FEUR&pair=BTC/USD&pair=BTC/USD"));
        assert_eq!(names(&pairs), vec!["BTC/USD", "BTC/USD", "BTC/CHF", "BTC/EUR"]);
    }

    #[test]
    fn test_parse_ignores_other_params() {
        let pairs = parse_pairs(Some("foo=bar&pair=+BTC/USD+"));
        assert_eq!(names(&pairs), vec!["BTC/USD"]);
    }
}
