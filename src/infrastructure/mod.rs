//! Infrastructure layer - cache engine, snapshot stores and runtime plumbing

pub mod cache;
pub mod logging;
pub mod observability;
pub mod persistence;
pub mod scheduler;
