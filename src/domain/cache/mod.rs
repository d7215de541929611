//! Cache domain - entries, keys, similarity and statistics

mod clock;
mod config;
mod entry;
mod key;
mod keywords;
mod lookup;
mod similarity;
mod stats;
mod value;

pub use clock::{Clock, ManualClock, SystemClock, add_duration};
pub use config::CacheConfig;
pub use entry::{CacheEntry, CacheEntryOptions, CachePriority, EvictionRank};
pub use key::CacheDigest;
pub use keywords::{KeywordSet, extract_keywords, is_stop_word};
pub use lookup::{CacheLookup, HitKind};
pub use similarity::{
    DEFAULT_SIMILARITY_THRESHOLD, SimilarityMatch, find_best_match, jaccard_similarity,
};
pub use stats::{CacheStatistics, StatisticsCollector};
pub use value::{CacheValue, CodecRegistry, CodecTag, StoredValue};
