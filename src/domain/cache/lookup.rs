//! Lookup outcomes

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which path produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitKind {
    Exact,
    Similar,
    Miss,
}

impl HitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Similar => "similar",
            Self::Miss => "miss",
        }
    }
}

impl fmt::Display for HitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `get_or_create`
#[derive(Debug, Clone)]
pub struct CacheLookup<T> {
    pub value: T,
    pub hit_kind: HitKind,
    /// 1.0 for exact hits, the Jaccard score for similar hits, 0.0 on a miss
    pub similarity_score: f64,
    pub retrieval_time: Duration,
}

impl<T> CacheLookup<T> {
    pub fn was_hit(&self) -> bool {
        self.hit_kind != HitKind::Miss
    }

    pub fn was_similar_match(&self) -> bool {
        self.hit_kind == HitKind::Similar
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
