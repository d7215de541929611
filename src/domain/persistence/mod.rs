//! Persistence domain - durable snapshot records and the store abstraction

mod config;
mod record;
mod repository;

pub use config::PersistenceConfig;
pub use record::{LoadedSnapshot, PersistedEntry, RestoreReport, SnapshotReport};
pub use repository::SnapshotStore;

#[cfg(test)]
pub use repository::mock;
