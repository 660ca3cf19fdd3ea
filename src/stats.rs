//! In-process counters for the resolution path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ResolverStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    not_found: AtomicU64,
    store_errors: AtomicU64,
    lookup_us_total: AtomicU64,
}

/// Point-in-time copy of [`ResolverStats`], served at `GET /stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub not_found: u64,
    pub store_errors: u64,
    pub lookups: u64,
    pub lookup_us_total: u64,
}

impl ResolverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, elapsed: Duration) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    /// A miss that the store answered with a record.
    pub fn record_miss(&self, elapsed: Duration) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    pub fn record_not_found(&self, elapsed: Duration) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.not_found.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    pub fn record_store_error(&self, elapsed: Duration) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        StatsSnapshot {
            cache_hits,
            cache_misses,
            not_found: self.not_found.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            lookups: cache_hits + cache_misses,
            lookup_us_total: self.lookup_us_total.load(Ordering::Relaxed),
        }
    }

    fn add_elapsed(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.lookup_us_total.fetch_add(us, Ordering::Relaxed);
    }
}
