//! Price aggregator - resolves requested pairs from cache and upstream
//!
//! A request is all-or-nothing: every pair resolves to a price, or the whole
//! request fails with a single error and nothing is written to the cache.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ltp_core::{
    is_valid_price, LtpEntry, LtpError, LtpResult, Pair, Price, ServiceConfig, Symbol,
    UpstreamError, UpstreamResult, DEFAULT_HTTP_TIMEOUT,
};

use crate::cache::{CacheStats, PriceCache};
use crate::source::PriceSource;
use crate::symbols::SymbolMapper;

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Deadline for a single upstream batch call
    pub upstream_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl From<&ServiceConfig> for AggregatorConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            upstream_timeout: config.http_timeout,
        }
    }
}

/// Missing pairs sharing one upstream symbol
#[derive(Debug)]
struct SymbolGroup<'a> {
    symbol: Symbol,
    pairs: Vec<&'a Pair>,
}

/// Main price aggregator
pub struct PriceAggregator {
    config: AggregatorConfig,
    cache: Arc<PriceCache>,
    mapper: Arc<SymbolMapper>,
    source: Arc<dyn PriceSource>,

    requests: AtomicU64,
    upstream_calls: AtomicU64,
}

impl PriceAggregator {
    pub fn new(
        config: AggregatorConfig,
        cache: Arc<PriceCache>,
        mapper: Arc<SymbolMapper>,
        source: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            config,
            cache,
            mapper,
            source,
            requests: AtomicU64::new(0),
            upstream_calls: AtomicU64::new(0),
        }
    }

    /// Get shared cache reference
    pub fn cache(&self) -> Arc<PriceCache> {
        Arc::clone(&self.cache)
    }

    pub fn mapper(&self) -> &SymbolMapper {
        &self.mapper
    }

    /// Resolve every requested pair, preserving order and duplicates
    pub async fn get_prices(&self, requested: &[Pair]) -> LtpResult<Vec<LtpEntry>> {
        self.get_prices_with_cancel(requested, &CancellationToken::new())
            .await
    }

    /// Like [`get_prices`](Self::get_prices), abandoning the upstream call once
    /// `cancel` fires
    pub async fn get_prices_with_cancel(
        &self,
        requested: &[Pair],
        cancel: &CancellationToken,
    ) -> LtpResult<Vec<LtpEntry>> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::with_capacity(requested.len());
        let distinct: Vec<&Pair> = requested.iter().filter(|p| seen.insert(*p)).collect();

        // Reject before touching the cache or the upstream
        if let Some(pair) = distinct.iter().find(|p| !self.mapper.is_supported(p)) {
            return Err(LtpError::UnsupportedPair((*pair).clone()));
        }

        let mut resolved: HashMap<&Pair, Price> = HashMap::with_capacity(distinct.len());
        let mut missing = Vec::new();
        for pair in distinct {
            match self.cache.get(pair) {
                Some(price) => {
                    debug!("Cache hit for {}", pair);
                    resolved.insert(pair, price);
                }
                None => missing.push(pair),
            }
        }

        if !missing.is_empty() {
            for (pair, price) in self.fetch_missing(&missing, cancel).await? {
                self.cache.set(pair.clone(), price);
                resolved.insert(pair, price);
            }
        }

        requested
            .iter()
            .map(|pair| {
                resolved
                    .get(pair)
                    .map(|price| LtpEntry::new(pair.clone(), *price))
                    .ok_or_else(|| LtpError::InternalInconsistency(pair.clone()))
            })
            .collect()
    }

    /// One upstream call for all missing pairs, fanned back out per pair
    async fn fetch_missing<'a>(
        &self,
        missing: &[&'a Pair],
        cancel: &CancellationToken,
    ) -> LtpResult<Vec<(&'a Pair, Price)>> {
        let groups = self.group_by_symbol(missing)?;
        let symbols: Vec<Symbol> = groups.iter().map(|g| g.symbol.clone()).collect();

        let prices = self.call_upstream(&symbols, cancel).await?;

        // Check every symbol before handing anything back for caching
        let mut fetched = Vec::with_capacity(missing.len());
        for group in &groups {
            let price = *prices
                .get(&group.symbol)
                .ok_or_else(|| LtpError::UpstreamMissingPrice(group.symbol.clone()))?;

            if !is_valid_price(price) {
                return Err(UpstreamError::InvalidPrice {
                    symbol: group.symbol.clone(),
                    raw: price.to_string(),
                }
                .into());
            }

            fetched.extend(group.pairs.iter().map(|pair| (*pair, price)));
        }

        Ok(fetched)
    }

    fn group_by_symbol<'a>(&self, missing: &[&'a Pair]) -> LtpResult<Vec<SymbolGroup<'a>>> {
        let mut groups: Vec<SymbolGroup<'a>> = Vec::new();
        let mut index: HashMap<&Symbol, usize> = HashMap::new();

        for pair in missing {
            let symbol = self
                .mapper
                .map_to_symbol(pair)
                .ok_or_else(|| LtpError::UnsupportedPair((*pair).clone()))?;

            let slot = *index.entry(symbol).or_insert_with(|| {
                groups.push(SymbolGroup {
                    symbol: symbol.clone(),
                    pairs: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].pairs.push(pair);
        }

        Ok(groups)
    }

    async fn call_upstream(
        &self,
        symbols: &[Symbol],
        cancel: &CancellationToken,
    ) -> UpstreamResult<HashMap<Symbol, Price>> {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        debug!(
            source = self.source.name(),
            symbols = ?symbols,
            "Fetching {} symbols from upstream",
            symbols.len()
        );

        let start = Instant::now();
        let call = tokio::time::timeout(
            self.config.upstream_timeout,
            self.source.batch_fetch(symbols, cancel),
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
            result = call => result.unwrap_or(Err(UpstreamError::Timeout)),
        };

        match &result {
            Ok(prices) => debug!(
                "Upstream returned {}/{} prices in {:?}",
                prices.len(),
                symbols.len(),
                start.elapsed()
            ),
            Err(e) => warn!(source = self.source.name(), "Upstream batch failed: {}", e),
        }

        result
    }

    /// Get statistics
    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            requests: self.requests.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            cache: self.cache.stats(),
        }
    }
}

/// Aggregator statistics
#[derive(Debug, Clone)]
pub struct AggregatorStats {
    pub requests: u64,
    pub upstream_calls: u64,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_clock::ManualClock;
    use crate::source::mock::MockSource;
    use crate::symbols::PairMapping;
    use proptest::prelude::*;
    use tokio_test::{assert_err, assert_ok};

    const TTL: Duration = Duration::from_secs(60);

    struct Fixture {
        aggregator: PriceAggregator,
        source: Arc<MockSource>,
        cache: Arc<PriceCache>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(mapper: SymbolMapper, source: MockSource, config: AggregatorConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(PriceCache::with_clock(TTL, clock.clone()));
        let source = Arc::new(source);
        let aggregator = PriceAggregator::new(
            config,
            Arc::clone(&cache),
            Arc::new(mapper),
            source.clone(),
        );

        Fixture {
            aggregator,
            source,
            cache,
            clock,
        }
    }

    fn kraken_fixture() -> Fixture {
        fixture_with(
            SymbolMapper::default(),
            MockSource::with_prices(&[
                ("XBTUSD", 52000.12),
                ("XBTEUR", 50000.12),
                ("XBTCHF", 49000.12),
            ]),
            AggregatorConfig::default(),
        )
    }

    fn pairs(names: &[&str]) -> Vec<Pair> {
        names.iter().map(|p| Pair::from(*p)).collect()
    }

    fn symbols(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|s| Symbol::from(*s)).collect()
    }

    #[tokio::test]
    async fn test_empty_request() {
        let f = kraken_fixture();

        let entries = assert_ok!(f.aggregator.get_prices(&[]).await);

        assert!(entries.is_empty());
        assert_eq!(f.source.call_count(), 0);
        assert_eq!(f.cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let f = kraken_fixture();

        let entries = assert_ok!(f.aggregator.get_prices(&pairs(&["BTC/USD"])).await);

        assert_eq!(entries, vec![LtpEntry::new(Pair::from("BTC/USD"), 52000.12)]);
        assert_eq!(f.source.calls(), vec![symbols(&["XBTUSD"])]);
        assert_eq!(f.cache.get(&Pair::from("BTC/USD")), Some(52000.12));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let f = kraken_fixture();
        f.cache.set(Pair::from("BTC/USD"), 51000.0);
        f.cache.set(Pair::from("BTC/EUR"), 49000.0);

        let entries = assert_ok!(
            f.aggregator
                .get_prices(&pairs(&["BTC/EUR", "BTC/USD"]))
                .await
        );

        assert_eq!(
            entries,
            vec![
                LtpEntry::new(Pair::from("BTC/EUR"), 49000.0),
                LtpEntry::new(Pair::from("BTC/USD"), 51000.0),
            ]
        );
        assert_eq!(f.source.call_count(), 0);
        assert_eq!(f.aggregator.stats().upstream_calls, 0);
    }

    #[tokio::test]
    async fn test_only_misses_are_fetched() {
        let f = kraken_fixture();
        f.cache.set(Pair::from("BTC/USD"), 51000.0);

        let entries = assert_ok!(
            f.aggregator
                .get_prices(&pairs(&["BTC/USD", "BTC/CHF"]))
                .await
        );

        assert_eq!(entries[0].amount, 51000.0);
        assert_eq!(entries[1].amount, 49000.12);
        assert_eq!(f.source.calls(), vec![symbols(&["XBTCHF"])]);
    }

    #[tokio::test]
    async fn test_expiry_forces_refetch() {
        let f = kraken_fixture();
        let btc_usd = pairs(&["BTC/USD"]);

        assert_ok!(f.aggregator.get_prices(&btc_usd).await);
        let first_expiry = f.cache.peek(&btc_usd[0]).unwrap().expires_at;

        f.source.set_price("XBTUSD", 53000.0);
        f.clock.advance(TTL + Duration::from_secs(1));

        let entries = assert_ok!(f.aggregator.get_prices(&btc_usd).await);

        assert_eq!(entries[0].amount, 53000.0);
        assert_eq!(f.source.call_count(), 2);
        assert!(f.cache.peek(&btc_usd[0]).unwrap().expires_at > first_expiry);
    }

    #[tokio::test]
    async fn test_order_and_duplicates_preserved() {
        let f = kraken_fixture();

        let entries = assert_ok!(
            f.aggregator
                .get_prices(&pairs(&["BTC/USD", "BTC/EUR", "BTC/USD"]))
                .await
        );

        assert_eq!(
            entries,
            vec![
                LtpEntry::new(Pair::from("BTC/USD"), 52000.12),
                LtpEntry::new(Pair::from("BTC/EUR"), 50000.12),
                LtpEntry::new(Pair::from("BTC/USD"), 52000.12),
            ]
        );
        assert_eq!(f.source.calls(), vec![symbols(&["XBTUSD", "XBTEUR"])]);
        assert_eq!(f.cache.stats().writes, 2);
    }

    #[tokio::test]
    async fn test_single_batch_for_all_misses() {
        let f = kraken_fixture();

        assert_ok!(
            f.aggregator
                .get_prices(&pairs(&["BTC/CHF", "BTC/USD", "BTC/EUR"]))
                .await
        );

        assert_eq!(
            f.source.calls(),
            vec![symbols(&["XBTCHF", "XBTUSD", "XBTEUR"])]
        );
    }

    #[tokio::test]
    async fn test_shared_symbol_fan_out() {
        let mapper = SymbolMapper::new(vec![
            PairMapping::new("BTC/USD", "XBTUSD", &["XBTUSD"]),
            PairMapping::new("XBT/USD", "XBTUSD", &["XBTUSD"]),
        ]);
        let f = fixture_with(
            mapper,
            MockSource::with_prices(&[("XBTUSD", 52000.0)]),
            AggregatorConfig::default(),
        );

        let entries = assert_ok!(
            f.aggregator
                .get_prices(&pairs(&["BTC/USD", "XBT/USD"]))
                .await
        );

        assert_eq!(entries[0].amount, 52000.0);
        assert_eq!(entries[1].amount, 52000.0);
        assert_eq!(f.source.calls(), vec![symbols(&["XBTUSD"])]);
        assert_eq!(f.cache.stats().writes, 2, "Each pair gets its own cache write");
        assert_eq!(f.cache.get(&Pair::from("BTC/USD")), Some(52000.0));
        assert_eq!(f.cache.get(&Pair::from("XBT/USD")), Some(52000.0));
    }

    #[tokio::test]
    async fn test_unsupported_pair_fails_whole_request() {
        let f = kraken_fixture();
        f.cache.set(Pair::from("BTC/USD"), 51000.0);
        let before = f.cache.stats();

        let err = assert_err!(
            f.aggregator
                .get_prices(&pairs(&["BTC/USD", "XYZ/ABC"]))
                .await
        );

        assert!(matches!(err, LtpError::UnsupportedPair(ref p) if p.as_str() == "XYZ/ABC"));
        assert_eq!(f.source.call_count(), 0);
        assert_eq!(f.cache.stats(), before, "No cache reads or writes expected");
    }

    #[tokio::test]
    async fn test_partial_upstream_result_aborts() {
        let f = fixture_with(
            SymbolMapper::default(),
            MockSource::with_prices(&[("XBTUSD", 52000.12)]),
            AggregatorConfig::default(),
        );

        let err = assert_err!(
            f.aggregator
                .get_prices(&pairs(&["BTC/USD", "BTC/EUR"]))
                .await
        );

        assert!(matches!(err, LtpError::UpstreamMissingPrice(ref s) if s.as_str() == "XBTEUR"));
        assert!(f.cache.is_empty(), "Nothing should be cached on failure");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_not_retried() {
        let f = kraken_fixture();
        f.source.fail_next();

        let err = assert_err!(f.aggregator.get_prices(&pairs(&["BTC/USD"])).await);

        assert!(matches!(
            err,
            LtpError::UpstreamUnavailable(UpstreamError::Transport(_))
        ));
        assert_eq!(f.source.call_count(), 1);
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_upstream_price_is_rejected() {
        let f = fixture_with(
            SymbolMapper::default(),
            MockSource::with_prices(&[("XBTUSD", 0.0)]),
            AggregatorConfig::default(),
        );

        let err = assert_err!(f.aggregator.get_prices(&pairs(&["BTC/USD"])).await);

        assert!(matches!(
            err,
            LtpError::UpstreamUnavailable(UpstreamError::InvalidPrice { .. })
        ));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_timeout() {
        let f = fixture_with(
            SymbolMapper::default(),
            MockSource::with_prices(&[("XBTUSD", 52000.12)]).delayed(Duration::from_secs(5)),
            AggregatorConfig {
                upstream_timeout: Duration::from_millis(20),
            },
        );

        let err = assert_err!(f.aggregator.get_prices(&pairs(&["BTC/USD"])).await);

        assert!(matches!(
            err,
            LtpError::UpstreamUnavailable(UpstreamError::Timeout)
        ));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let f = fixture_with(
            SymbolMapper::default(),
            MockSource::with_prices(&[("XBTUSD", 52000.12)]).delayed(Duration::from_secs(5)),
            AggregatorConfig::default(),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = assert_err!(
            f.aggregator
                .get_prices_with_cancel(&pairs(&["BTC/USD"]), &cancel)
                .await
        );

        assert!(matches!(
            err,
            LtpError::UpstreamUnavailable(UpstreamError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let f = kraken_fixture();
        let request = pairs(&["BTC/USD", "BTC/EUR", "BTC/CHF"]);

        let results =
            futures::future::join_all((0..8).map(|_| f.aggregator.get_prices(&request))).await;

        for result in results {
            let entries = assert_ok!(result);
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].amount, 52000.12);
        }
        assert_eq!(f.aggregator.stats().requests, 8);
        assert!(f.source.call_count() >= 1);
    }

    proptest! {
        #[test]
        fn prop_response_replays_request(
            indices in proptest::collection::vec(0usize..3, 0..12)
        ) {
            let whitelist = ["BTC/USD", "BTC/CHF", "BTC/EUR"];
            let request: Vec<Pair> = indices.iter().map(|i| Pair::from(whitelist[*i])).collect();
            let f = kraken_fixture();

            let entries = tokio_test::block_on(f.aggregator.get_prices(&request)).unwrap();

            prop_assert_eq!(entries.len(), request.len());
            for (entry, pair) in entries.iter().zip(&request) {
                prop_assert_eq!(&entry.pair, pair);
                prop_assert_eq!(Some(entry.amount), f.cache.peek(pair).map(|e| e.price));
            }
            prop_assert!(f.source.call_count() <= 1);
        }
    }
}
