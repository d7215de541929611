//! Cache key digests

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fixed-length fingerprint of a cache key used for O(1) exact lookup
///
/// The full SHA-256 output is kept. Entries also retain their original key, so
/// a lookup can tell a genuine match from a collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheDigest(String);

impl CacheDigest {
    /// Length of the hex-encoded digest
    pub const LEN: usize = 64;

    /// Computes the digest of a cache key
    pub fn of(key: &str) -> Self {
        let hash = Sha256::digest(key.as_bytes());
        Self(hex::encode(hash))
    }

    /// Returns the hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}
