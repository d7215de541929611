//! Cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::similarity::DEFAULT_SIMILARITY_THRESHOLD;

/// Configuration for the intelligent cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries before a batch eviction runs
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Number of entries removed per eviction round
    #[serde(default = "default_eviction_batch")]
    pub eviction_batch: usize,

    /// Minimum Jaccard score for a similarity hit (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Whether `get_or_create` falls back to similarity matching by default
    #[serde(default = "default_true")]
    pub enable_similarity: bool,

    /// Lifetime of entries written without an explicit expiration, in seconds.
    /// `None` keeps such entries until evicted or invalidated.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: Option<u64>,
}

fn default_capacity() -> usize {
    1000
}

fn default_eviction_batch() -> usize {
    100
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> Option<u64> {
    Some(3600)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            eviction_batch: default_eviction_batch(),
            similarity_threshold: default_similarity_threshold(),
            enable_similarity: default_true(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default entry lifetime as a Duration
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Capacity, never less than one entry
    pub fn effective_capacity(&self) -> usize {
        self.capacity.max(1)
    }

    /// Eviction batch, never less than one entry
    pub fn effective_eviction_batch(&self) -> usize {
        self.eviction_batch.max(1)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_eviction_batch(mut self, batch: usize) -> Self {
        self.eviction_batch = batch;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_similarity(mut self, enabled: bool) -> Self {
        self.enable_similarity = enabled;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl_secs = ttl.map(|ttl| ttl.as_secs());
        self
    }
}
