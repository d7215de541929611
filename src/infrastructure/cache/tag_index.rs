//! Tag to digest index for bulk invalidation

use std::collections::{BTreeSet, HashSet};

use dashmap::DashMap;

use crate::domain::cache::CacheDigest;

/// Maps each tag to the digests of entries carrying it
///
/// Only accelerates invalidation: entries are the source of truth, and a
/// digest left here after its entry vanished is harmless.
#[derive(Debug, Default)]
pub(crate) struct TagIndex {
    tags: DashMap<String, HashSet<CacheDigest>>,
}

impl TagIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn index(&self, digest: &CacheDigest, tags: &BTreeSet<String>) {
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(digest.clone());
        }
    }

    /// Drops `digest` from every listed tag, removing buckets left empty
    pub(crate) fn unindex(&self, digest: &CacheDigest, tags: &BTreeSet<String>) {
        for tag in tags {
            if let Some(mut digests) = self.tags.get_mut(tag) {
                digests.remove(digest);
            }

            self.tags.remove_if(tag, |_, digests| digests.is_empty());
        }
    }

    /// Removes the bucket for `tag`, returning its digests
    pub(crate) fn take(&self, tag: &str) -> Vec<CacheDigest> {
        self.tags
            .remove(tag)
            .map(|(_, digests)| digests.into_iter().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn digests(&self, tag: &str) -> Vec<CacheDigest> {
        self.tags
            .get(tag)
            .map(|digests| digests.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of tags with at least one digest
    #[cfg(test)]
    pub(crate) fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub(crate) fn clear(&self) {
        self.tags.clear();
    }
}
