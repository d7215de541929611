//! Intelligent answer cache
//!
//! An in-process cache for expensive, repeatable computations such as
//! generated answers keyed by a question:
//! - Exact lookups with near-duplicate fallback through keyword similarity
//! - Bounded memory with priority and recency based batch eviction
//! - Tag and pattern based bulk invalidation
//! - Durable snapshots of important entries across restarts
//! - Single-flight coalescing of concurrent misses

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    CacheConfig, CacheEntryOptions, CacheError, CacheLookup, CachePriority, CacheStatistics,
    CacheValue, HitKind,
};
pub use infrastructure::cache::{IntelligentCache, IntelligentCacheBuilder};
pub use infrastructure::scheduler::{CacheScheduler, SchedulerConfig};

use std::sync::Arc;

use tracing::info;

use domain::persistence::SnapshotStore;
use infrastructure::persistence::{InMemorySnapshotStore, JsonFileSnapshotStore};

/// Create the cache described by the application configuration
///
/// With persistence enabled, snapshots go to the configured JSON file;
/// otherwise they are kept in memory only.
pub fn create_cache(config: &AppConfig) -> IntelligentCache {
    let store: Arc<dyn SnapshotStore> = if config.persistence.enabled {
        info!(
            path = %config.persistence.snapshot_path.display(),
            "Using JSON file snapshot store"
        );
        Arc::new(JsonFileSnapshotStore::new(&config.persistence.snapshot_path))
    } else {
        info!("Persistence disabled, using in-memory snapshot store");
        Arc::new(InMemorySnapshotStore::new())
    };

    IntelligentCache::builder()
        .with_config(config.cache.clone())
        .with_snapshot_store(store)
        .with_restore_ttl(config.persistence.restore_ttl())
        .build()
}
