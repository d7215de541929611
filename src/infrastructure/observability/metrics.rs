//! Cache metrics
//!
//! Emitted through the `metrics` facade. Without an installed recorder every
//! call is a no-op, so the library never requires an exporter.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::domain::cache::HitKind;

/// Record one resolved lookup
pub fn record_lookup(kind: HitKind, elapsed: Duration) {
    let labels = [("kind", kind.as_str())];

    match kind {
        HitKind::Miss => counter!("intelli_cache_misses_total").increment(1),
        HitKind::Exact | HitKind::Similar => {
            counter!("intelli_cache_hits_total", &labels).increment(1)
        }
    }

    histogram!("intelli_cache_retrieval_seconds", &labels).record(elapsed.as_secs_f64());
}

/// Record entries removed by capacity eviction
pub fn record_evictions(count: usize) {
    counter!("intelli_cache_evictions_total").increment(count as u64);
}

/// Record entries removed by the expiry sweep
pub fn record_expired(count: usize) {
    counter!("intelli_cache_expired_total").increment(count as u64);
}

/// Record the current number of entries
pub fn record_items(items: usize) {
    gauge!("intelli_cache_items").set(items as f64);
}

/// Record a completed snapshot
pub fn record_snapshot(persisted: usize, duration: Duration) {
    counter!("intelli_cache_snapshots_total").increment(1);
    gauge!("intelli_cache_snapshot_entries").set(persisted as f64);
    histogram!("intelli_cache_snapshot_seconds").record(duration.as_secs_f64());
}

/// Record a completed restore
pub fn record_restore(restored: usize, skipped: usize) {
    counter!("intelli_cache_restored_total").increment(restored as u64);
    counter!("intelli_cache_restore_skipped_total").increment(skipped as u64);
}

/// Record a persistence failure that was swallowed
pub fn record_persistence_failure(operation: &'static str) {
    counter!("intelli_cache_persistence_failures_total", "operation" => operation).increment(1);
}
