//! Snapshot store trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::CacheError;

use super::record::{LoadedSnapshot, PersistedEntry};

/// Durable medium holding the latest cache snapshot
///
/// `save` replaces the previous snapshot as a whole. Implementations should
/// skip records they cannot parse and report them through
/// `LoadedSnapshot::malformed` rather than failing the whole load.
#[async_trait]
pub trait SnapshotStore: Send + Sync + Debug {
    /// Replaces the stored snapshot with `records`
    async fn save(&self, records: &[PersistedEntry]) -> Result<(), CacheError>;

    /// Reads the stored snapshot; an absent snapshot is empty, not an error
    async fn load(&self) -> Result<LoadedSnapshot, CacheError>;

    /// Removes the stored snapshot
    async fn clear(&self) -> Result<(), CacheError>;
}
