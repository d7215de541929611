//! Observability infrastructure - Metrics

mod metrics;

pub use self::metrics::{
    record_evictions, record_expired, record_items, record_lookup, record_persistence_failure,
    record_restore, record_snapshot,
};
