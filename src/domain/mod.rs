//! Domain layer - cache model, persistence records and errors

pub mod cache;
pub mod error;
pub mod persistence;

pub use cache::{
    CacheConfig, CacheDigest, CacheEntry, CacheEntryOptions, CacheLookup, CachePriority,
    CacheStatistics, CacheValue, Clock, CodecRegistry, CodecTag, HitKind, KeywordSet,
    ManualClock, StoredValue, SystemClock,
};
pub use error::CacheError;
pub use persistence::{
    LoadedSnapshot, PersistedEntry, PersistenceConfig, RestoreReport, SnapshotReport,
    SnapshotStore,
};
