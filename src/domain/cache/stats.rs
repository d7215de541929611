//! Cache statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::lookup::HitKind;

/// Point-in-time view of cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Exact-key hits
    pub hits: u64,
    pub misses: u64,
    pub similarity_hits: u64,
    pub evictions: u64,
    /// Entries currently held, placeholders and not-yet-swept expired ones included
    pub items: usize,
    pub total_retrieval_time: Duration,
    pub retrievals: u64,
}

impl CacheStatistics {
    /// Percentage of lookups answered from the cache
    ///
    /// Similarity hits count as hits. Defined as 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.similarity_hits;
        let total = served + self.misses;

        if total == 0 {
            return 0.0;
        }

        served as f64 / total as f64 * 100.0
    }

    /// Mean retrieval latency
    pub fn avg_retrieval_time(&self) -> Duration {
        if self.retrievals == 0 {
            return Duration::ZERO;
        }

        let nanos = self.total_retrieval_time.as_nanos() / u128::from(self.retrievals);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Lock-free counters updated on every lookup
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    similarity_hits: AtomicU64,
    evictions: AtomicU64,
    retrieval_nanos: AtomicU64,
    retrievals: AtomicU64,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the resolution of one lookup
    pub fn record(&self, kind: HitKind, elapsed: Duration) {
        let counter = match kind {
            HitKind::Exact => &self.hits,
            HitKind::Similar => &self.similarity_hits,
            HitKind::Miss => &self.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.retrieval_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.retrievals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Snapshot of the counters with the current item count
    pub fn snapshot(&self, items: usize) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            similarity_hits: self.similarity_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            items,
            total_retrieval_time: Duration::from_nanos(self.retrieval_nanos.load(Ordering::Relaxed)),
            retrievals: self.retrievals.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.similarity_hits,
            &self.evictions,
            &self.retrieval_nanos,
            &self.retrievals,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
