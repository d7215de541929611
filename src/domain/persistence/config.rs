//! Persistence configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for durable snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Whether snapshots are written to disk; otherwise they stay in memory
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Location of the JSON snapshot file
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Lifetime granted to entries brought back by a restore, in seconds
    #[serde(default = "default_restore_ttl_secs")]
    pub restore_ttl_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/cache-snapshot.json")
}

fn default_restore_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            snapshot_path: default_snapshot_path(),
            restore_ttl_secs: default_restore_ttl_secs(),
        }
    }
}

impl PersistenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore_ttl(&self) -> Duration {
        Duration::from_secs(self.restore_ttl_secs)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn with_restore_ttl(mut self, ttl: Duration) -> Self {
        self.restore_ttl_secs = ttl.as_secs();
        self
    }
}
