//! Intelligent cache implementation
//!
//! A concurrent in-process cache that answers exact key lookups, falls back
//! to keyword similarity for near-duplicate keys, evicts in priority order
//! once full, and snapshots its durable entries through a `SnapshotStore`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use super::single_flight::SingleFlight;
use super::tag_index::TagIndex;
use crate::domain::cache::{
    CacheConfig, CacheDigest, CacheEntry, CacheEntryOptions, CacheLookup, CachePriority,
    CacheStatistics, CacheValue, Clock, CodecRegistry, EvictionRank, HitKind,
    StatisticsCollector, StoredValue, SystemClock, extract_keywords, find_best_match,
    jaccard_similarity,
};
use crate::domain::persistence::{
    PersistenceConfig, RestoreReport, SnapshotReport, SnapshotStore,
};
use crate::domain::CacheError;
use crate::infrastructure::observability;
use crate::infrastructure::persistence::{InMemorySnapshotStore, PersistenceManager};

/// Concurrent cache with similarity fallback and durable snapshots
///
/// Cloning is cheap; clones share the same entries, statistics and
/// persistence state.
#[derive(Debug, Clone)]
pub struct IntelligentCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    entries: DashMap<CacheDigest, CacheEntry>,
    tags: TagIndex,
    in_flight: SingleFlight,
    codecs: Arc<CodecRegistry>,
    stats: StatisticsCollector,
    persistence: PersistenceManager,
}

impl IntelligentCache {
    /// Creates a cache with the system clock and an in-memory snapshot store
    pub fn new(config: CacheConfig) -> Self {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> IntelligentCacheBuilder {
        IntelligentCacheBuilder::new()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Codec registry used to validate restored values
    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.inner.codecs
    }

    /// Returns the value for `key`, producing it with `factory` on a miss
    ///
    /// Tries the exact key first, then (when similarity is enabled for this
    /// call) the live entry whose keywords best match the key. On a full
    /// miss, concurrent callers for the same key share a single `factory`
    /// invocation. A factory error is returned unchanged and nothing is
    /// cached.
    pub async fn get_or_create<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: CacheEntryOptions,
    ) -> Result<CacheLookup<T>, E>
    where
        T: CacheValue,
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let start = Instant::now();
        let digest = CacheDigest::of(key);
        let now = self.inner.clock.now();

        if let Some(value) = self.inner.lookup_exact::<T>(key, &digest, now) {
            return Ok(self.inner.resolve(value, HitKind::Exact, 1.0, start));
        }

        let similarity = options
            .enable_similarity
            .unwrap_or(self.inner.config.enable_similarity);

        if similarity {
            if let Some((value, score)) = self.inner.lookup_similar::<T>(key, now) {
                debug!(key = %key, score, "Similarity hit");
                return Ok(self.inner.resolve(value, HitKind::Similar, score, start));
            }
        }

        let cache = Arc::downgrade(&self.inner);
        let owned_key = key.to_string();

        let (outcome, joined) = self
            .inner
            .in_flight
            .run(&digest, move || async move {
                let value = factory().await?;

                if let Some(inner) = cache.upgrade() {
                    if let Err(e) = inner.put(&owned_key, &value, &options) {
                        warn!(key = %owned_key, error = %e, "Failed to cache produced value");
                    }
                }

                Ok(value)
            })
            .await;

        let elapsed = start.elapsed();
        self.inner.record(HitKind::Miss, elapsed);
        debug!(key = %key, joined, success = outcome.is_ok(), "Cache miss resolved");

        Ok(CacheLookup {
            value: outcome?,
            hit_kind: HitKind::Miss,
            similarity_score: 0.0,
            retrieval_time: elapsed,
        })
    }

    /// Exact lookup
    pub fn get<T: CacheValue>(&self, key: &str) -> Option<T> {
        let start = Instant::now();
        let digest = CacheDigest::of(key);
        let now = self.inner.clock.now();

        let found = self.inner.lookup_exact::<T>(key, &digest, now);
        let kind = if found.is_some() {
            HitKind::Exact
        } else {
            HitKind::Miss
        };
        self.inner.record(kind, start.elapsed());

        found
    }

    /// Stores `value` under `key`, replacing any previous entry
    pub fn set<T: CacheValue>(
        &self,
        key: &str,
        value: T,
        options: CacheEntryOptions,
    ) -> Result<(), CacheError> {
        self.inner.put(key, &value, &options)
    }

    /// Removes the entry for `key`, returning whether one existed
    pub fn invalidate(&self, key: &str) -> bool {
        let digest = CacheDigest::of(key);

        match self.inner.entries.remove_if(&digest, |_, entry| entry.key() == key) {
            Some((digest, entry)) => {
                self.inner.tags.unindex(&digest, entry.tags());
                self.inner.publish_items();
                debug!(key = %key, "Invalidated cache entry");
                true
            }
            None => false,
        }
    }

    /// Removes every entry carrying `tag`
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut removed = 0;

        for digest in self.inner.tags.take(tag) {
            if self.inner.remove_where(&digest, |entry| entry.tags().contains(tag)) {
                removed += 1;
            }
        }

        self.inner.publish_items();
        debug!(tag = %tag, removed, "Invalidated cache entries by tag");
        removed
    }

    /// Removes every entry whose key contains `pattern`
    ///
    /// An empty pattern removes nothing.
    pub fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        if pattern.is_empty() {
            return 0;
        }

        let matching: Vec<CacheDigest> = self
            .inner
            .entries
            .iter()
            .filter(|item| item.value().key().contains(pattern))
            .map(|item| item.key().clone())
            .collect();

        let removed = matching
            .iter()
            .filter(|digest| {
                self.inner
                    .remove_where(digest, |entry| entry.key().contains(pattern))
            })
            .count();

        self.inner.publish_items();
        debug!(pattern = %pattern, removed, "Invalidated cache entries by pattern");
        removed
    }

    /// Removes every entry past its absolute expiration
    pub fn clear_expired(&self) -> usize {
        let removed = self.inner.purge_expired(self.inner.clock.now());
        self.inner.publish_items();

        removed
    }

    /// Drops every entry; statistics are kept
    pub fn clear(&self) {
        self.inner.entries.clear();
        self.inner.tags.clear();
        self.inner.publish_items();
    }

    /// Number of entries held, placeholders and unswept expired ones included
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Installs low-priority placeholders for keys not yet cached
    ///
    /// Placeholders hold no value and are never served; a later `set` fills
    /// them in. Returns the number of placeholders installed.
    pub fn warmup<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let options = CacheEntryOptions::new().with_priority(CachePriority::Low);
        let now = self.inner.clock.now();
        let mut installed = 0;

        for key in keys {
            let key = key.as_ref();
            let digest = CacheDigest::of(key);

            if self.inner.entries.contains_key(&digest) {
                continue;
            }

            let placeholder =
                CacheEntry::new(key, None, &options, now, self.inner.config.default_ttl());
            self.inner.insert(placeholder);
            installed += 1;
        }

        debug!(installed, "Cache warmup placeholders installed");
        installed
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.inner.stats.snapshot(self.inner.entries.len())
    }

    pub fn reset_statistics(&self) {
        self.inner.stats.reset();
    }

    /// Writes the durable entries to the snapshot store
    pub async fn persist_snapshot(&self) -> Result<SnapshotReport, CacheError> {
        self.inner
            .persistence
            .snapshot(|now| {
                self.inner
                    .entries
                    .iter()
                    .filter_map(|item| PersistenceManager::record_for(item.value(), now))
                    .collect()
            })
            .await
    }

    /// Restores entries from the snapshot store
    ///
    /// Keys that already hold a live value in memory keep it.
    pub async fn load_snapshot(&self) -> Result<RestoreReport, CacheError> {
        let report = self
            .inner
            .persistence
            .restore(|entry| self.inner.install_restored(entry))
            .await?;

        self.inner.publish_items();
        Ok(report)
    }

    /// Removes the stored snapshot
    pub async fn clear_snapshot(&self) -> Result<(), CacheError> {
        self.inner.persistence.clear().await
    }

    #[cfg(test)]
    fn tag_count(&self) -> usize {
        self.inner.tags.tag_count()
    }
}

impl CacheInner {
    /// Exact digest lookup with key verification
    ///
    /// Expired entries are removed on the spot. Placeholders, entries of
    /// another codec and digest collisions all read as absent.
    fn lookup_exact<T: CacheValue>(
        &self,
        key: &str,
        digest: &CacheDigest,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let mut expired = false;

        let found = match self.entries.get_mut(digest) {
            Some(mut guard) => {
                let entry = guard.value_mut();

                if entry.key() != key {
                    debug!(digest = %digest, "Digest collision, treating as absent");
                    None
                } else if entry.is_expired_at(now) {
                    expired = true;
                    None
                } else {
                    match entry.value().map(StoredValue::decode::<T>) {
                        Some(Ok(value)) => {
                            entry.touch(now);
                            Some(value)
                        }
                        Some(Err(e)) => {
                            debug!(key = %key, error = %e, "Cached value not readable as requested type");
                            None
                        }
                        None => None,
                    }
                }
            }
            None => None,
        };

        if expired && self.remove_where(digest, |entry| entry.is_expired_at(now)) {
            observability::record_expired(1);
            self.publish_items();
        }

        found
    }

    /// Best keyword match among live entries holding a `T`
    fn lookup_similar<T: CacheValue>(&self, key: &str, now: DateTime<Utc>) -> Option<(T, f64)> {
        let query = extract_keywords(key);

        if query.is_empty() {
            return None;
        }

        let candidates: Vec<(CacheDigest, f64)> = self
            .entries
            .iter()
            .filter_map(|item| {
                let entry = item.value();
                let value = entry.value()?;

                if entry.is_expired_at(now) || !value.is_codec_of::<T>() {
                    return None;
                }

                Some((item.key().clone(), jaccard_similarity(&query, entry.keywords())))
            })
            .collect();

        let best = find_best_match(candidates, self.config.similarity_threshold)?;

        let mut guard = self.entries.get_mut(&best.candidate)?;
        let entry = guard.value_mut();

        if entry.is_expired_at(now) {
            return None;
        }

        let value = entry.value()?.decode::<T>().ok()?;
        entry.touch(now);

        Some((value, best.score))
    }

    fn resolve<T>(&self, value: T, kind: HitKind, score: f64, start: Instant) -> CacheLookup<T> {
        let elapsed = start.elapsed();
        self.record(kind, elapsed);

        CacheLookup {
            value,
            hit_kind: kind,
            similarity_score: score,
            retrieval_time: elapsed,
        }
    }

    fn record(&self, kind: HitKind, elapsed: Duration) {
        self.stats.record(kind, elapsed);
        observability::record_lookup(kind, elapsed);
    }

    /// Encodes and stores a value
    fn put<T: CacheValue>(
        &self,
        key: &str,
        value: &T,
        options: &CacheEntryOptions,
    ) -> Result<(), CacheError> {
        let stored = StoredValue::encode(value)?;
        self.codecs.register::<T>();

        let entry = CacheEntry::new(
            key,
            Some(stored),
            options,
            self.clock.now(),
            self.config.default_ttl(),
        );
        self.insert(entry);

        Ok(())
    }

    /// Inserts an entry, evicting a batch first when a new digest would
    /// exceed capacity
    fn insert(&self, entry: CacheEntry) {
        let digest = entry.digest().clone();
        let tags = entry.tags().clone();

        if !self.entries.contains_key(&digest) && self.at_capacity() {
            self.purge_expired(self.clock.now());

            if self.at_capacity() {
                self.evict_batch();
            }
        }

        if let Some(previous) = self.entries.insert(digest.clone(), entry) {
            self.tags.unindex(&digest, previous.tags());
        }
        self.tags.index(&digest, &tags);

        self.publish_items();
    }

    fn at_capacity(&self) -> bool {
        self.entries.len() >= self.config.effective_capacity()
    }

    /// Removes every entry expired at `now`
    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<CacheDigest> = self
            .entries
            .iter()
            .filter(|item| item.value().is_expired_at(now))
            .map(|item| item.key().clone())
            .collect();

        let removed = expired
            .iter()
            .filter(|digest| self.remove_where(digest, |entry| entry.is_expired_at(now)))
            .count();

        if removed > 0 {
            observability::record_expired(removed);
            debug!(removed, "Cleared expired cache entries");
        }

        removed
    }

    /// Removes the lowest-ranked live entries
    fn evict_batch(&self) -> usize {
        let mut ranks: Vec<EvictionRank> = self
            .entries
            .iter()
            .map(|item| item.value().eviction_rank())
            .collect();
        ranks.sort_unstable();

        let evicted = ranks
            .into_iter()
            .take(self.config.effective_eviction_batch())
            .filter(|rank| self.remove_where(&rank.digest, |_| true))
            .count();

        if evicted > 0 {
            self.stats.record_evictions(evicted as u64);
            observability::record_evictions(evicted);
            debug!(evicted, remaining = self.entries.len(), "Evicted cache entries");
        }

        evicted
    }

    /// Removes the entry for `digest` if `predicate` holds, pruning its tags
    fn remove_where<P>(&self, digest: &CacheDigest, predicate: P) -> bool
    where
        P: FnOnce(&CacheEntry) -> bool,
    {
        match self.entries.remove_if(digest, |_, entry| predicate(entry)) {
            Some((digest, entry)) => {
                self.tags.unindex(&digest, entry.tags());
                true
            }
            None => false,
        }
    }

    /// Installs a restored entry unless its key already holds a live value
    fn install_restored(&self, entry: CacheEntry) -> bool {
        let now = self.clock.now();

        let live = self.entries.get(entry.digest()).is_some_and(|existing| {
            let existing = existing.value();
            existing.key() == entry.key() && !existing.is_placeholder() && !existing.is_expired_at(now)
        });

        if live {
            return false;
        }

        self.insert(entry);
        true
    }

    fn publish_items(&self) {
        observability::record_items(self.entries.len());
    }
}

/// Builder for `IntelligentCache`
pub struct IntelligentCacheBuilder {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SnapshotStore>,
    codecs: Arc<CodecRegistry>,
    restore_ttl: Duration,
}

impl IntelligentCacheBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            clock: Arc::new(SystemClock),
            store: Arc::new(InMemorySnapshotStore::new()),
            codecs: Arc::new(CodecRegistry::with_builtin()),
            restore_ttl: PersistenceConfig::default().restore_ttl(),
        }
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    /// Lifetime given to entries restored from a snapshot
    pub fn with_restore_ttl(mut self, ttl: Duration) -> Self {
        self.restore_ttl = ttl;
        self
    }

    pub fn with_codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = codecs;
        self
    }

    /// Registers a value type so its snapshot records can be restored
    /// before the first `set` of that type
    pub fn register_value<T: CacheValue>(self) -> Self {
        self.codecs.register::<T>();
        self
    }

    pub fn build(self) -> IntelligentCache {
        let persistence = PersistenceManager::new(
            self.store,
            self.codecs.clone(),
            self.clock.clone(),
            self.restore_ttl,
        );

        IntelligentCache {
            inner: Arc::new(CacheInner {
                config: self.config,
                clock: self.clock,
                entries: DashMap::new(),
                tags: TagIndex::new(),
                in_flight: SingleFlight::new(),
                codecs: self.codecs,
                stats: StatisticsCollector::new(),
                persistence,
            }),
        }
    }
}

impl Default for IntelligentCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::domain::cache::ManualClock;
    use crate::domain::persistence::mock::MockSnapshotStore;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Answer {
        text: String,
        verses: Vec<String>,
    }

    impl CacheValue for Answer {
        const TYPE_TAG: &'static str = "answer";
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn cache_with(config: CacheConfig) -> (IntelligentCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = IntelligentCache::builder()
            .with_config(config)
            .with_clock(clock.clone())
            .build();
        (cache, clock)
    }

    fn cache() -> (IntelligentCache, Arc<ManualClock>) {
        cache_with(CacheConfig::default())
    }

    fn opts() -> CacheEntryOptions {
        CacheEntryOptions::new()
    }

    async fn produce(
        cache: &IntelligentCache,
        key: &str,
        value: &str,
    ) -> CacheLookup<String> {
        let value = value.to_string();
        cache
            .get_or_create(key, move || async move { Ok::<_, String>(value) }, opts())
            .await
            .unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache();

        cache.set("k", "v".to_string(), opts()).unwrap();

        assert_eq!(cache.get::<String>("k"), Some("v".to_string()));
        assert_eq!(cache.get::<String>("missing"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_set_overwrites() {
        let (cache, _) = cache();

        cache.set("k", "first".to_string(), opts()).unwrap();
        cache.set("k", "second".to_string(), opts()).unwrap();

        assert_eq!(cache.get::<String>("k"), Some("second".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_custom_value_type() {
        let (cache, _) = cache();
        let answer = Answer {
            text: "Faith is trust".to_string(),
            verses: vec!["Hebrews 11:1".to_string()],
        };

        cache.set("faith", answer.clone(), opts()).unwrap();

        assert_eq!(cache.get::<Answer>("faith"), Some(answer));
        assert_eq!(cache.get::<String>("faith"), None);
        assert!(cache.codecs().is_registered(&Answer::codec()));
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, clock) = cache();
        let short = opts().with_ttl(Duration::from_millis(50));

        cache.set("looked-up", "a".to_string(), short.clone()).unwrap();
        cache.set("swept", "b".to_string(), short).unwrap();
        cache.set("durable", "c".to_string(), opts()).unwrap();

        clock.advance(Duration::from_millis(100));

        assert_eq!(cache.get::<String>("looked-up"), None);
        assert_eq!(cache.statistics().items, 2);

        assert_eq!(cache.clear_expired(), 1);
        assert_eq!(cache.statistics().items, 1);
        assert_eq!(cache.get::<String>("durable"), Some("c".to_string()));
    }

    #[test]
    fn test_expired_lookup_counts_as_miss() {
        let (cache, clock) = cache();

        cache
            .set("k", "v".to_string(), opts().with_ttl(Duration::from_secs(1)))
            .unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.get::<String>("k"), None);

        let stats = cache.statistics();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.items, 0);
    }

    #[tokio::test]
    async fn test_get_or_create_replaces_expired_entry() {
        let (cache, clock) = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .set(
                "k",
                "stale".to_string(),
                opts().with_tag("old").with_ttl(Duration::from_secs(1)),
            )
            .unwrap();
        clock.advance(Duration::from_secs(2));

        let counter = calls.clone();
        let lookup = cache
            .get_or_create(
                "k",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("fresh".to_string())
                },
                opts(),
            )
            .await
            .unwrap();

        assert_eq!(lookup.value, "fresh");
        assert_eq!(lookup.hit_kind, HitKind::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.tag_count(), 0);
        assert_eq!(cache.invalidate_by_tag("old"), 0);
        assert_eq!(cache.get::<String>("k"), Some("fresh".to_string()));
        assert_eq!(cache.statistics().misses, 1);
    }

    #[test]
    fn test_absolute_expiration() {
        let (cache, clock) = cache();
        let deadline = start() + chrono::Duration::seconds(5);

        cache
            .set("k", "v".to_string(), opts().with_absolute_expiration(deadline))
            .unwrap();
        assert!(cache.get::<String>("k").is_some());

        clock.set(deadline);
        assert!(cache.get::<String>("k").is_none());
    }

    #[test]
    fn test_default_ttl_applies() {
        let config = CacheConfig::default().with_default_ttl(Some(Duration::from_secs(60)));
        let (cache, clock) = cache_with(config);

        cache.set("k", "v".to_string(), opts()).unwrap();
        clock.advance(Duration::from_secs(61));

        assert!(cache.get::<String>("k").is_none());
    }

    #[test]
    fn test_capacity_bound_evicts_batch() {
        let config = CacheConfig::default()
            .with_capacity(10)
            .with_eviction_batch(3);
        let (cache, _) = cache_with(config);

        for i in 0..10 {
            cache.set(&format!("key-{}", i), i.to_string(), opts()).unwrap();
        }
        assert_eq!(cache.len(), 10);

        cache.set("key-10", "10".to_string(), opts()).unwrap();

        let stats = cache.statistics();
        assert_eq!(stats.items, 8);
        assert_eq!(stats.evictions, 3);
        assert!(stats.items <= 10);
    }

    #[test]
    fn test_eviction_order_prefers_low_priority_and_cold_entries() {
        let config = CacheConfig::default()
            .with_capacity(6)
            .with_eviction_batch(3);
        let (cache, clock) = cache_with(config);

        for key in ["low-1", "low-2"] {
            cache
                .set(key, key.to_string(), opts().with_priority(CachePriority::Low))
                .unwrap();
        }
        for key in ["cold", "warm", "hot"] {
            cache.set(key, key.to_string(), opts()).unwrap();
        }
        cache
            .set("critical", "c".to_string(), opts().with_priority(CachePriority::Critical))
            .unwrap();

        clock.advance(Duration::from_secs(1));
        cache.get::<String>("warm");
        cache.get::<String>("hot");
        cache.get::<String>("hot");

        cache.set("new", "n".to_string(), opts()).unwrap();

        assert!(cache.get::<String>("low-1").is_none());
        assert!(cache.get::<String>("low-2").is_none());
        assert!(cache.get::<String>("cold").is_none());
        assert!(cache.get::<String>("warm").is_some());
        assert!(cache.get::<String>("hot").is_some());
        assert!(cache.get::<String>("critical").is_some());
        assert!(cache.get::<String>("new").is_some());
    }

    #[test]
    fn test_expired_entries_are_purged_before_eviction() {
        let config = CacheConfig::default().with_capacity(4).with_eviction_batch(2);
        let (cache, clock) = cache_with(config);

        for key in ["dead-1", "dead-2"] {
            cache
                .set(
                    key,
                    key.to_string(),
                    opts()
                        .with_priority(CachePriority::High)
                        .with_ttl(Duration::from_secs(1)),
                )
                .unwrap();
        }
        clock.advance(Duration::from_secs(2));

        for key in ["live-a", "live-b", "live-c"] {
            cache.set(key, key.to_string(), opts()).unwrap();
        }

        assert_eq!(cache.get::<String>("live-a"), Some("live-a".to_string()));
        assert_eq!(cache.get::<String>("live-b"), Some("live-b".to_string()));
        assert_eq!(cache.get::<String>("live-c"), Some("live-c".to_string()));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.statistics().evictions, 0);
    }

    #[test]
    fn test_zero_capacity_holds_single_entry() {
        let (cache, _) = cache_with(CacheConfig::default().with_capacity(0));

        cache.set("a", "1".to_string(), opts()).unwrap();
        cache.set("b", "2".to_string(), opts()).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<String>("b"), Some("2".to_string()));
        assert_eq!(cache.statistics().evictions, 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let config = CacheConfig::default().with_capacity(2).with_eviction_batch(1);
        let (cache, _) = cache_with(config);

        cache.set("a", "1".to_string(), opts()).unwrap();
        cache.set("b", "2".to_string(), opts()).unwrap();
        cache.set("a", "3".to_string(), opts()).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.statistics().evictions, 0);
    }

    #[tokio::test]
    async fn test_get_or_create_exact_hit() {
        let (cache, _) = cache();
        cache.set("k", "cached".to_string(), opts()).unwrap();

        let lookup = cache
            .get_or_create(
                "k",
                || async { Err::<String, String>("factory must not run".to_string()) },
                opts(),
            )
            .await
            .unwrap();

        assert_eq!(lookup.value, "cached");
        assert_eq!(lookup.hit_kind, HitKind::Exact);
        assert!(lookup.was_hit());
        assert!(!lookup.was_similar_match());
        assert_eq!(lookup.similarity_score, 1.0);
    }

    #[tokio::test]
    async fn test_get_or_create_miss_stores_value() {
        let (cache, _) = cache();

        let lookup = produce(&cache, "k", "fresh").await;
        assert_eq!(lookup.value, "fresh");
        assert_eq!(lookup.hit_kind, HitKind::Miss);
        assert!(!lookup.was_hit());
        assert_eq!(lookup.similarity_score, 0.0);

        assert_eq!(cache.get::<String>("k"), Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_get_or_create_applies_options() {
        let (cache, clock) = cache();

        for key in ["tagged", "short-lived"] {
            cache
                .get_or_create(
                    key,
                    || async { Ok::<_, String>("v".to_string()) },
                    opts().with_ttl(Duration::from_secs(1)).with_tag("faith"),
                )
                .await
                .unwrap();
        }

        assert_eq!(cache.invalidate_by_tag("faith"), 2);

        produce(&cache, "short-lived", "v").await;
        assert!(cache.get::<String>("short-lived").is_some());

        cache.invalidate("short-lived");
        cache
            .get_or_create(
                "short-lived",
                || async { Ok::<_, String>("v".to_string()) },
                opts().with_ttl(Duration::from_secs(1)),
            )
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(cache.get::<String>("short-lived").is_none());
    }

    #[tokio::test]
    async fn test_similarity_fallback() {
        let (cache, _) = cache();
        cache
            .set("Peter: What is faith?", "answer-A".to_string(), opts())
            .unwrap();

        let lookup = cache
            .get_or_create(
                "Peter: What's faith?",
                || async { Ok::<_, String>("fresh".to_string()) },
                opts().with_similarity(true),
            )
            .await
            .unwrap();

        assert_eq!(lookup.value, "answer-A");
        assert!(lookup.was_similar_match());
        assert!(lookup.similarity_score >= 0.85);
    }

    #[tokio::test]
    async fn test_low_overlap_is_a_miss() {
        let (cache, _) = cache();
        cache
            .set("Peter: What is faith?", "answer-A".to_string(), opts())
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let lookup = cache
            .get_or_create(
                "Peter: What is hope?",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("answer-B".to_string())
                },
                opts().with_similarity(true),
            )
            .await
            .unwrap();

        assert_eq!(lookup.value, "answer-B");
        assert_eq!(lookup.hit_kind, HitKind::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_similarity_can_be_disabled() {
        let (cache, _) = cache();
        cache
            .set("Peter: What is faith?", "answer-A".to_string(), opts())
            .unwrap();

        let lookup = cache
            .get_or_create(
                "Peter: What's faith?",
                || async { Ok::<_, String>("fresh".to_string()) },
                opts().with_similarity(false),
            )
            .await
            .unwrap();

        assert_eq!(lookup.value, "fresh");
        assert_eq!(lookup.hit_kind, HitKind::Miss);
    }

    #[tokio::test]
    async fn test_similarity_ignores_expired_and_other_types() {
        let (cache, clock) = cache();
        cache
            .set(
                "Peter: What is faith?",
                "expired".to_string(),
                opts().with_ttl(Duration::from_secs(1)),
            )
            .unwrap();
        cache
            .set("Peter: what faith", serde_json::json!({"other": true}), opts())
            .unwrap();
        clock.advance(Duration::from_secs(2));

        let lookup = produce(&cache, "Peter: What's faith?", "fresh").await;
        assert_eq!(lookup.value, "fresh");
        assert_eq!(lookup.hit_kind, HitKind::Miss);
    }

    #[tokio::test]
    async fn test_factory_error_propagates_and_is_not_cached() {
        let (cache, _) = cache();

        let result = cache
            .get_or_create(
                "k",
                || async { Err::<String, _>("model unavailable".to_string()) },
                opts(),
            )
            .await;

        assert_eq!(result.unwrap_err(), "model unavailable");
        assert!(cache.is_empty());
        assert_eq!(cache.statistics().misses, 1);

        let lookup = produce(&cache, "k", "recovered").await;
        assert_eq!(lookup.value, "recovered");
    }

    #[tokio::test]
    async fn test_concurrent_misses_run_factory_once() {
        let (cache, _) = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();

            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create(
                        "Peter: Why do we pray?",
                        move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, String>("answer".to_string())
                        },
                        opts(),
                    )
                    .await
            }));
        }

        for handle in handles {
            let lookup = handle.await.unwrap().unwrap();
            assert_eq!(lookup.value, "answer");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.inner.in_flight.len(), 0);
    }

    #[test]
    fn test_tag_invalidation() {
        let (cache, _) = cache();
        cache.set("k1", "v1".to_string(), opts().with_tag("x")).unwrap();
        cache.set("k2", "v2".to_string(), opts().with_tag("x")).unwrap();
        cache.set("k3", "v3".to_string(), opts().with_tag("y")).unwrap();

        assert_eq!(cache.invalidate_by_tag("x"), 2);
        assert!(cache.get::<String>("k1").is_none());
        assert!(cache.get::<String>("k2").is_none());
        assert!(cache.get::<String>("k3").is_some());
        assert_eq!(cache.invalidate_by_tag("x"), 0);
    }

    #[test]
    fn test_tag_invalidation_tolerates_stale_index() {
        let (cache, _) = cache();
        cache.set("k", "v".to_string(), opts().with_tag("x")).unwrap();
        cache.set("k", "v".to_string(), opts().with_tag("z")).unwrap();

        assert_eq!(cache.invalidate_by_tag("x"), 0);
        assert!(cache.get::<String>("k").is_some());
        assert_eq!(cache.invalidate_by_tag("z"), 1);
    }

    #[test]
    fn test_tag_index_pruned_on_every_removal_path() {
        let config = CacheConfig::default().with_capacity(2).with_eviction_batch(1);
        let (cache, clock) = cache_with(config);

        cache.set("a", "v".to_string(), opts().with_tag("a")).unwrap();
        cache.invalidate("a");
        assert_eq!(cache.tag_count(), 0);

        cache
            .set("b", "v".to_string(), opts().with_tag("b").with_ttl(Duration::from_secs(1)))
            .unwrap();
        clock.advance(Duration::from_secs(2));
        cache.clear_expired();
        assert_eq!(cache.tag_count(), 0);

        cache
            .set("c", "v".to_string(), opts().with_tag("c").with_priority(CachePriority::Low))
            .unwrap();
        cache.set("d", "v".to_string(), opts()).unwrap();
        cache.set("e", "v".to_string(), opts()).unwrap();
        assert!(cache.get::<String>("c").is_none());
        assert_eq!(cache.tag_count(), 0);

        cache.set("f", "v".to_string(), opts().with_tag("f")).unwrap();
        cache.invalidate_by_pattern("f");
        assert_eq!(cache.tag_count(), 0);
    }

    #[test]
    fn test_pattern_invalidation() {
        let (cache, _) = cache();
        cache.set("Peter: What is faith?", "a".to_string(), opts()).unwrap();
        cache.set("Peter: Why pray?", "b".to_string(), opts()).unwrap();
        cache.set("Paul: What is grace?", "c".to_string(), opts()).unwrap();

        assert_eq!(cache.invalidate_by_pattern(""), 0);
        assert_eq!(cache.invalidate_by_pattern("Peter:"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get::<String>("Paul: What is grace?").is_some());
    }

    #[test]
    fn test_missing_keys_are_not_errors() {
        let (cache, _) = cache();

        assert!(!cache.invalidate("nothing"));
        assert_eq!(cache.invalidate_by_tag("nothing"), 0);
        assert_eq!(cache.invalidate_by_pattern("nothing"), 0);
        assert_eq!(cache.clear_expired(), 0);
        assert!(cache.get::<String>("nothing").is_none());
    }

    #[test]
    fn test_digest_collision_reads_as_absent() {
        let (cache, _) = cache();
        let value = StoredValue::encode(&"intruder".to_string()).unwrap();
        let forged = CacheEntry::new("other key", Some(value), &opts(), start(), None);
        cache.inner.entries.insert(CacheDigest::of("k"), forged);

        assert!(cache.get::<String>("k").is_none());
        assert!(!cache.invalidate("k"));

        cache.set("k", "mine".to_string(), opts()).unwrap();
        assert_eq!(cache.get::<String>("k"), Some("mine".to_string()));
    }

    #[test]
    fn test_warmup_installs_placeholders() {
        let (cache, _) = cache();
        cache.set("existing", "v".to_string(), opts()).unwrap();

        assert_eq!(cache.warmup(["a", "b", "existing"]), 2);
        assert_eq!(cache.len(), 3);
        assert!(cache.get::<String>("a").is_none());
        assert_eq!(cache.get::<String>("existing"), Some("v".to_string()));

        cache.set("a", "filled".to_string(), opts()).unwrap();
        assert_eq!(cache.get::<String>("a"), Some("filled".to_string()));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_placeholders_are_never_similarity_hits() {
        let (cache, _) = cache();
        cache.warmup(["Peter: What is faith?"]);

        let lookup = produce(&cache, "Peter: What's faith?", "fresh").await;
        assert_eq!(lookup.hit_kind, HitKind::Miss);
    }

    #[tokio::test]
    async fn test_statistics_accuracy() {
        let (cache, _) = cache();
        cache
            .set("Peter: What is faith?", "answer-A".to_string(), opts())
            .unwrap();

        for _ in 0..3 {
            assert_eq!(
                produce(&cache, "Peter: What is faith?", "x").await.hit_kind,
                HitKind::Exact
            );
        }
        assert_eq!(
            produce(&cache, "Peter: What's faith?", "x").await.hit_kind,
            HitKind::Similar
        );
        assert_eq!(produce(&cache, "Why pray?", "x").await.hit_kind, HitKind::Miss);
        assert_eq!(produce(&cache, "Who was Moses?", "x").await.hit_kind, HitKind::Miss);

        let stats = cache.statistics();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.similarity_hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.retrievals, 6);
        assert!((stats.hit_rate() - 66.67).abs() < 0.01);

        cache.reset_statistics();
        assert_eq!(cache.statistics().hit_rate(), 0.0);
    }

    #[test]
    fn test_hits_update_access_metadata() {
        let (cache, clock) = cache();
        cache.set("k", "v".to_string(), opts()).unwrap();

        clock.advance(Duration::from_secs(5));
        cache.get::<String>("k");
        cache.get::<String>("k");

        let entry = cache.inner.entries.get(&CacheDigest::of("k")).unwrap();
        assert_eq!(entry.value().access_count(), 2);
        assert_eq!(entry.value().last_access(), clock.now());
        assert!(entry.value().created() <= entry.value().last_access());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let (cache, _) = cache();

        cache
            .set("high", "kept".to_string(), opts().with_priority(CachePriority::High))
            .unwrap();
        cache
            .set("low", "dropped".to_string(), opts().with_priority(CachePriority::Low))
            .unwrap();

        let snapshot = cache.persist_snapshot().await.unwrap();
        assert_eq!(snapshot.persisted, 1);

        cache.clear();
        assert!(cache.is_empty());

        let restored = cache.load_snapshot().await.unwrap();
        assert_eq!(restored.restored, 1);
        assert_eq!(cache.get::<String>("high"), Some("kept".to_string()));
        assert!(cache.get::<String>("low").is_none());
    }

    #[tokio::test]
    async fn test_restore_keeps_live_entries_and_skips_corrupt() {
        let store = Arc::new(MockSnapshotStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let cache = IntelligentCache::builder()
            .with_clock(clock.clone())
            .with_snapshot_store(store.clone())
            .register_value::<Answer>()
            .build();

        cache
            .set("live", "old".to_string(), opts().with_priority(CachePriority::High))
            .unwrap();
        cache
            .set("answer", Answer { text: "t".to_string(), verses: vec![] }, opts())
            .unwrap();
        cache.persist_snapshot().await.unwrap();
        assert_eq!(store.records().len(), 2);

        let mut records = store.records();
        records.push(crate::domain::persistence::PersistedEntry {
            key: "renamed".to_string(),
            value_json: "{}".to_string(),
            value_type_tag: "gone@v1".to_string(),
            created: start(),
            priority: CachePriority::High,
            tags: vec![],
        });
        let store = Arc::new(MockSnapshotStore::new().with_records(records));
        let restoring = IntelligentCache::builder()
            .with_clock(clock)
            .with_snapshot_store(store)
            .register_value::<Answer>()
            .build();
        restoring.set("live", "new".to_string(), opts()).unwrap();

        let report = restoring.load_snapshot().await.unwrap();

        assert_eq!(report.restored, 1);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(restoring.get::<String>("live"), Some("new".to_string()));
        assert_eq!(
            restoring.get::<Answer>("answer").map(|a| a.text),
            Some("t".to_string())
        );
    }

    #[tokio::test]
    async fn test_restored_entries_expire_after_restore_ttl() {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = IntelligentCache::builder()
            .with_clock(clock.clone())
            .with_restore_ttl(Duration::from_secs(60))
            .build();

        cache
            .set("k", "v".to_string(), opts().with_priority(CachePriority::High))
            .unwrap();
        cache.persist_snapshot().await.unwrap();
        cache.clear();
        cache.load_snapshot().await.unwrap();

        clock.advance(Duration::from_secs(61));
        assert!(cache.get::<String>("k").is_none());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let store = Arc::new(MockSnapshotStore::new().with_error("disk full"));
        let cache = IntelligentCache::builder()
            .with_snapshot_store(store)
            .build();
        cache.set("k", "v".to_string(), opts()).unwrap();

        assert!(cache.persist_snapshot().await.is_err());
        assert!(cache.load_snapshot().await.is_err());
        assert_eq!(cache.get::<String>("k"), Some("v".to_string()));
    }
}
