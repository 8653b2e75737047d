//! Last-traded-price aggregation
//!
//! Features:
//! - TTL price cache with eviction on read
//! - Static pair to upstream symbol whitelist
//! - One batched upstream call per request for every cache miss
//! - Kraken REST ticker client

pub mod aggregator;
pub mod cache;
pub mod kraken;
pub mod source;
pub mod symbols;

pub use aggregator::{AggregatorConfig, AggregatorStats, PriceAggregator};
pub use cache::{CacheEntry, CacheStats, Clock, PriceCache, SystemClock};
pub use kraken::{KrakenClient, KrakenConfig};
pub use source::PriceSource;
pub use symbols::{PairMapping, SymbolMapper};
