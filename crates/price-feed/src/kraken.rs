//! Kraken public REST ticker client

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use ltp_core::{
    is_valid_price, ConfigError, Price, ServiceConfig, Symbol, UpstreamError, UpstreamResult,
    DEFAULT_HTTP_TIMEOUT, DEFAULT_KRAKEN_BASE_URL,
};

use crate::source::PriceSource;
use crate::symbols::SymbolMapper;

const TICKER_PATH: &str = "/0/public/Ticker";

/// Upper bound on how much of an error body is kept
const MAX_ERROR_BODY: usize = 1024;

/// Kraken `Ticker` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TickerResponse {
    #[serde(default)]
    pub error: Vec<String>,
    #[serde(default)]
    pub result: HashMap<String, TickerEntry>,
}

/// Relevant part of a ticker entry.
/// `c` is "last trade closed": `[price, lot volume]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TickerEntry {
    #[serde(default)]
    pub c: Vec<String>,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct KrakenConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_KRAKEN_BASE_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl From<&ServiceConfig> for KrakenConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            base_url: config.kraken_base_url.clone(),
            timeout: config.http_timeout,
        }
    }
}

/// Batch ticker lookups against the Kraken public API
#[derive(Debug, Clone)]
pub struct KrakenClient {
    ticker_url: Url,
    http: reqwest::Client,
    mapper: Arc<SymbolMapper>,
}

impl KrakenClient {
    pub fn new(config: KrakenConfig) -> Result<Self, ConfigError> {
        Self::with_mapper(config, Arc::new(SymbolMapper::default()))
    }

    pub fn with_mapper(config: KrakenConfig, mapper: Arc<SymbolMapper>) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ConfigError::Invalid(format!("invalid Kraken base url {:?}: {}", config.base_url, e))
        })?;
        let ticker_url = base_url
            .join(TICKER_PATH)
            .map_err(|e| ConfigError::Invalid(format!("invalid Kraken base url: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            ticker_url,
            http,
            mapper,
        })
    }

    /// Full request URL for a batch of symbols
    pub fn ticker_url(&self, symbols: &[Symbol]) -> Url {
        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut url = self.ticker_url.clone();
        url.query_pairs_mut().append_pair("pair", &joined);
        url
    }

    async fn fetch_tickers(&self, symbols: &[Symbol]) -> UpstreamResult<TickerResponse> {
        let url = self.ticker_url(symbols);
        debug!("GET {}", url);

        let response = self.http.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PriceSource for KrakenClient {
    async fn batch_fetch(
        &self,
        symbols: &[Symbol],
        cancel: &CancellationToken,
    ) -> UpstreamResult<HashMap<Symbol, Price>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
            response = self.fetch_tickers(symbols) => response?,
        };

        extract_prices(&response, symbols, &self.mapper)
    }

    fn name(&self) -> &'static str {
        "kraken"
    }
}

/// Pull the last traded price of each requested symbol out of a ticker response.
///
/// Symbols with no usable entry are left out of the result.
pub fn extract_prices(
    response: &TickerResponse,
    symbols: &[Symbol],
    mapper: &SymbolMapper,
) -> UpstreamResult<HashMap<Symbol, Price>> {
    if !response.error.is_empty() {
        let message = response.error.join("; ");
        warn!("Kraken returned errors: {}", message);
        return Err(UpstreamError::Api(message));
    }

    let mut prices = HashMap::with_capacity(symbols.len());
    for symbol in symbols {
        let raw = mapper
            .response_keys(symbol)
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(symbol.as_str()))
            .find_map(|key| response.result.get(key).and_then(|e| e.c.first()));

        let Some(raw) = raw else {
            debug!("No ticker entry for {}", symbol);
            continue;
        };

        let price = parse_price(raw).ok_or_else(|| UpstreamError::InvalidPrice {
            symbol: symbol.clone(),
            raw: raw.clone(),
        })?;
        prices.insert(symbol.clone(), price);
    }

    Ok(prices)
}

/// Kraken prices are dot-decimal strings
fn parse_price(raw: &str) -> Option<Price> {
    raw.trim().parse::<Price>().ok().filter(|p| is_valid_price(*p))
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(e.to_string())
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
