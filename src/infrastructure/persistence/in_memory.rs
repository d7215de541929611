//! In-memory snapshot store

use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::CacheError;
use crate::domain::persistence::{LoadedSnapshot, PersistedEntry, SnapshotStore};

/// Thread-safe in-memory snapshot store
///
/// Useful for testing and for running without a disk. The snapshot is lost
/// when the process terminates.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    records: RwLock<Vec<PersistedEntry>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records
    pub fn with_records(records: Vec<PersistedEntry>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, records: &[PersistedEntry]) -> Result<(), CacheError> {
        let mut stored = self.records.write().map_err(|e| {
            CacheError::persistence(format!("Failed to acquire write lock: {}", e))
        })?;

        *stored = records.to_vec();
        Ok(())
    }

    async fn load(&self) -> Result<LoadedSnapshot, CacheError> {
        let stored = self.records.read().map_err(|e| {
            CacheError::persistence(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(LoadedSnapshot::new(stored.clone()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut stored = self.records.write().map_err(|e| {
            CacheError::persistence(format!("Failed to acquire write lock: {}", e))
        })?;

        stored.clear();
        Ok(())
    }
}
