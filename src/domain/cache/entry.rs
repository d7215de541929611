//! Cache entries and per-entry options

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::add_duration;
use super::key::CacheDigest;
use super::keywords::{KeywordSet, extract_keywords};
use super::value::StoredValue;
use crate::domain::CacheError;

/// Retention priority, ordered from first-evicted to last-evicted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl CachePriority {
    /// Entries below `Normal` never reach a durable snapshot
    pub fn is_durable(self) -> bool {
        self >= Self::Normal
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for CachePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CachePriority {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(CacheError::configuration(format!(
                "Unknown cache priority '{}'",
                other
            ))),
        }
    }
}

/// Options applied when an entry is written
#[derive(Debug, Clone, Default)]
pub struct CacheEntryOptions {
    /// Fixed deadline; wins over `ttl`
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Lifetime relative to the write
    pub ttl: Option<Duration>,
    /// Informational only, never renewed automatically
    pub sliding_expiration: Option<Duration>,
    pub priority: CachePriority,
    pub tags: BTreeSet<String>,
    /// `None` falls back to the cache-wide default
    pub enable_similarity: Option<bool>,
}

impl CacheEntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_absolute_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_similarity(mut self, enabled: bool) -> Self {
        self.enable_similarity = Some(enabled);
        self
    }

    /// Resolves the absolute deadline for an entry written at `now`
    pub fn resolve_expiration(
        &self,
        now: DateTime<Utc>,
        default_ttl: Option<Duration>,
    ) -> Option<DateTime<Utc>> {
        self.absolute_expiration
            .or_else(|| self.ttl.or(default_ttl).and_then(|ttl| add_duration(now, ttl)))
    }
}

/// Sort key for eviction: lowest ranks go first
///
/// Priority, then access count, then last access. Creation time and digest
/// only break exact ties so the order is total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EvictionRank {
    pub priority: CachePriority,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub digest: CacheDigest,
}

/// A single cached item
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    digest: CacheDigest,
    value: Option<StoredValue>,
    created: DateTime<Utc>,
    last_access: DateTime<Utc>,
    absolute_expiration: Option<DateTime<Utc>>,
    sliding_expiration: Option<Duration>,
    priority: CachePriority,
    tags: BTreeSet<String>,
    keywords: KeywordSet,
    access_count: u64,
}

impl CacheEntry {
    /// Creates an entry written at `now`
    ///
    /// A `None` value makes a placeholder that is never served as a hit.
    pub fn new(
        key: impl Into<String>,
        value: Option<StoredValue>,
        options: &CacheEntryOptions,
        now: DateTime<Utc>,
        default_ttl: Option<Duration>,
    ) -> Self {
        let key = key.into();

        Self {
            digest: CacheDigest::of(&key),
            keywords: extract_keywords(&key),
            key,
            value,
            created: now,
            last_access: now,
            absolute_expiration: options.resolve_expiration(now, default_ttl),
            sliding_expiration: options.sliding_expiration,
            priority: options.priority,
            tags: options.tags.clone(),
            access_count: 0,
        }
    }

    /// Backdates the creation time, never past `last_access`
    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created.min(self.last_access);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn digest(&self) -> &CacheDigest {
        &self.digest
    }

    pub fn value(&self) -> Option<&StoredValue> {
        self.value.as_ref()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    pub fn absolute_expiration(&self) -> Option<DateTime<Utc>> {
        self.absolute_expiration
    }

    pub fn sliding_expiration(&self) -> Option<Duration> {
        self.sliding_expiration
    }

    pub fn priority(&self) -> CachePriority {
        self.priority
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Warmup entries carry no value yet
    pub fn is_placeholder(&self) -> bool {
        self.value.is_none()
    }

    /// Returns true once the absolute deadline has been reached
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.absolute_expiration, Some(deadline) if deadline <= now)
    }

    /// Records a hit
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access = now.max(self.created);
        self.access_count = self.access_count.saturating_add(1);
    }

    pub fn eviction_rank(&self) -> EvictionRank {
        EvictionRank {
            priority: self.priority,
            access_count: self.access_count,
            last_access: self.last_access,
            created: self.created,
            digest: self.digest.clone(),
        }
    }
}
