//! Keyword-overlap similarity between cache keys

use super::keywords::KeywordSet;

/// Default minimum score for a similarity hit
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Best candidate found by a similarity scan
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch<K> {
    pub candidate: K,
    pub score: f64,
}

/// Jaccard index `|a ∩ b| / |a ∪ b|` of two keyword sets
///
/// Returns 0 when either set is empty, so an empty key never matches anything.
pub fn jaccard_similarity(a: &KeywordSet, b: &KeywordSet) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;

    intersection as f64 / union as f64
}

/// Picks the candidate with the strictly highest score at or above `threshold`
///
/// Candidates arrive already scored. Ties keep the first one encountered.
pub fn find_best_match<K, I>(candidates: I, threshold: f64) -> Option<SimilarityMatch<K>>
where
    I: IntoIterator<Item = (K, f64)>,
{
    let mut best: Option<SimilarityMatch<K>> = None;

    for (candidate, score) in candidates {
        if score < threshold || score <= 0.0 {
            continue;
        }

        let better = best.as_ref().is_none_or(|current| score > current.score);

        if better {
            best = Some(SimilarityMatch { candidate, score });
        }
    }

    best
}
