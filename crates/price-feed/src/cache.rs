//! In-memory price cache with per-entry expiry
//!
//! Entries are keyed by pair and evicted lazily: the first read that sees an
//! expired entry removes it. There is no background sweep and no size limit.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ltp_core::{Pair, Price};

/// Monotonic time source used for expiry checks
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Cached price with its expiry
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub price: Price,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Thread-safe TTL cache of last traded prices
pub struct PriceCache {
    entries: RwLock<HashMap<Pair, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,

    /// Stats
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    writes: AtomicU64,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get an unexpired price, evicting the entry if it has expired
    pub fn get(&self, pair: &Pair) -> Option<Price> {
        let entry = self.entries.read().get(pair).copied();
        let Some(entry) = entry else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let now = self.clock.now();

        if !entry.is_expired(now) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.price);
        }

        // A writer may have refreshed the entry between the two locks
        let mut entries = self.entries.write();
        if entries.get(pair).is_some_and(|e| e.is_expired(now)) {
            entries.remove(pair);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        drop(entries);

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite a price, starting a fresh TTL
    pub fn set(&self, pair: Pair, price: Price) {
        let entry = CacheEntry {
            price,
            expires_at: self.clock.now() + self.ttl,
        };

        self.entries.write().insert(pair, entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Raw entry lookup without expiry handling
    pub fn peek(&self, pair: &Pair) -> Option<CacheEntry> {
        self.entries.read().get(pair).copied()
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for PriceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
}
