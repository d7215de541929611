//! Snapshot and restore of durable cache entries

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::cache::{
    CacheEntry, CacheEntryOptions, Clock, CodecRegistry, CodecTag, StoredValue,
};
use crate::domain::persistence::{PersistedEntry, RestoreReport, SnapshotReport, SnapshotStore};
use crate::domain::CacheError;
use crate::infrastructure::observability;

/// Moves the durable subset of the cache in and out of a `SnapshotStore`
///
/// Snapshot and restore share one lock, so a periodic snapshot never
/// interleaves with a restore or with another snapshot.
#[derive(Debug)]
pub struct PersistenceManager {
    store: Arc<dyn SnapshotStore>,
    codecs: Arc<CodecRegistry>,
    clock: Arc<dyn Clock>,
    restore_ttl: Duration,
    lock: Mutex<()>,
}

impl PersistenceManager {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        codecs: Arc<CodecRegistry>,
        clock: Arc<dyn Clock>,
        restore_ttl: Duration,
    ) -> Self {
        Self {
            store,
            codecs,
            clock,
            restore_ttl,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn restore_ttl(&self) -> Duration {
        self.restore_ttl
    }

    /// Converts an entry to its durable form
    ///
    /// Returns `None` for entries that do not belong in a snapshot: low
    /// priority, placeholders, and entries already expired at `now`.
    pub fn record_for(entry: &CacheEntry, now: DateTime<Utc>) -> Option<PersistedEntry> {
        if !entry.priority().is_durable() || entry.is_expired_at(now) {
            return None;
        }

        let value = entry.value()?;

        Some(PersistedEntry {
            key: entry.key().to_string(),
            value_json: value.json.to_string(),
            value_type_tag: value.codec.to_string(),
            created: entry.created(),
            priority: entry.priority(),
            tags: entry.tags().iter().cloned().collect(),
        })
    }

    /// Writes a snapshot of the records produced by `collect`
    ///
    /// `collect` runs while the lock is held, so the records reflect the
    /// cache at the moment this snapshot was admitted.
    pub async fn snapshot<F>(&self, collect: F) -> Result<SnapshotReport, CacheError>
    where
        F: FnOnce(DateTime<Utc>) -> Vec<PersistedEntry>,
    {
        let _guard = self.lock.lock().await;
        let start = Instant::now();

        let mut records = collect(self.clock.now());
        records.sort_by(|a, b| a.key.cmp(&b.key));

        self.store.save(&records).await?;

        let report = SnapshotReport {
            persisted: records.len(),
        };

        observability::record_snapshot(report.persisted, start.elapsed());
        info!(
            persisted = report.persisted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cache snapshot written"
        );

        Ok(report)
    }

    /// Reads the stored snapshot and hands every decodable entry to `install`
    ///
    /// `install` returns false when the key already has a live entry, which
    /// is then left untouched. Records that fail to decode are skipped.
    pub async fn restore<F>(&self, mut install: F) -> Result<RestoreReport, CacheError>
    where
        F: FnMut(CacheEntry) -> bool,
    {
        let _guard = self.lock.lock().await;

        let loaded = self.store.load().await?;
        let now = self.clock.now();

        let mut report = RestoreReport {
            skipped: loaded.malformed,
            ..RestoreReport::default()
        };

        for record in loaded.records {
            let key = record.key.clone();

            match self.decode(record, now) {
                Ok(entry) => {
                    if install(entry) {
                        report.restored += 1;
                    } else {
                        debug!(key = %key, "Snapshot entry already present, keeping live value");
                        report.already_present += 1;
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unrestorable snapshot entry");
                    report.skipped += 1;
                }
            }
        }

        observability::record_restore(report.restored, report.skipped);
        info!(
            restored = report.restored,
            skipped = report.skipped,
            already_present = report.already_present,
            "Cache snapshot restored"
        );

        Ok(report)
    }

    /// Removes the stored snapshot
    pub async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        self.store.clear().await
    }

    fn decode(&self, record: PersistedEntry, now: DateTime<Utc>) -> Result<CacheEntry, CacheError> {
        let codec: CodecTag = record.value_type_tag.parse()?;

        let json: serde_json::Value = serde_json::from_str(&record.value_json).map_err(|e| {
            CacheError::codec(format!("Stored value is not valid JSON: {}", e))
        })?;

        self.codecs.validate(&codec, &json)?;

        let options = CacheEntryOptions::new()
            .with_priority(record.priority)
            .with_tags(record.tags)
            .with_ttl(self.restore_ttl);

        let entry = CacheEntry::new(record.key, Some(StoredValue { json, codec }), &options, now, None)
            .with_created(record.created);

        Ok(entry)
    }
}
