//! Keyword extraction for similarity matching

use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;

/// Normalized set of significant words taken from a key
pub type KeywordSet = BTreeSet<String>;

/// Tokens of this length or shorter are never keywords
const MIN_KEYWORD_LEN: usize = 3;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Articles and determiners
        "the", "this", "that", "these", "those", "some", "any", "each", "every",
        // Prepositions and conjunctions
        "about", "above", "after", "again", "against", "and", "around", "before", "below",
        "between", "but", "during", "for", "from", "into", "nor", "off", "onto", "out", "over",
        "than", "then", "through", "under", "until", "upon", "with", "within", "without",
        // Pronouns
        "her", "hers", "herself", "him", "himself", "his", "its", "itself", "mine", "myself",
        "our", "ours", "ourselves", "she", "their", "theirs", "them", "themselves", "they",
        "you", "your", "yours", "yourself", "yourselves",
        // Auxiliaries and modals
        "are", "aren", "been", "being", "can", "cannot", "could", "couldn", "did", "didn",
        "does", "doesn", "doing", "don", "had", "hadn", "has", "hasn", "have", "haven",
        "having", "isn", "may", "might", "must", "shall", "should", "shouldn", "was", "wasn",
        "were", "weren", "will", "won", "would", "wouldn",
        // Filler
        "also", "just", "not", "only", "please", "too", "very",
    ]
    .into_iter()
    .collect()
});

/// Returns true when the word is filtered out as a stop word
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Extracts the keyword set of a piece of text
///
/// Lower-cases the input, splits on anything that is not alphanumeric and
/// keeps tokens longer than two characters that are not stop words. Empty
/// input yields an empty set.
pub fn extract_keywords(text: &str) -> KeywordSet {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .filter(|token| !is_stop_word(token))
        .collect()
}
