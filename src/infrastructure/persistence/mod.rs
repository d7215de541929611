//! Snapshot stores and the persistence manager

mod file;
mod in_memory;
mod manager;

pub use file::JsonFileSnapshotStore;
pub use in_memory::InMemorySnapshotStore;
pub use manager::PersistenceManager;
