//! Durable snapshot records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cache::CachePriority;

/// One cache entry in durable form
///
/// The value travels as a JSON string next to the codec tag that produced it,
/// so a record can be validated on its own without trusting the rest of the
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub key: String,
    pub value_json: String,
    pub value_type_tag: String,
    pub created: DateTime<Utc>,
    pub priority: CachePriority,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Records read back from a snapshot store
#[derive(Debug, Clone, Default)]
pub struct LoadedSnapshot {
    pub records: Vec<PersistedEntry>,
    /// Records the store could not even parse into a `PersistedEntry`
    pub malformed: usize,
}

impl LoadedSnapshot {
    pub fn new(records: Vec<PersistedEntry>) -> Self {
        Self {
            records,
            malformed: 0,
        }
    }
}

/// Outcome of writing a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    pub persisted: usize,
}

/// Outcome of restoring a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    /// Malformed records, unknown codecs and undecodable values
    pub skipped: usize,
    /// Records whose key already had a live entry in memory
    pub already_present: usize,
}
