//! JSON file snapshot store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::domain::CacheError;
use crate::domain::persistence::{LoadedSnapshot, PersistedEntry, SnapshotStore};

/// Snapshot store backed by a single JSON file
///
/// The file holds a flat array of records. Writes go to a sibling temporary
/// file that is then renamed over the target, so a crash mid-write leaves the
/// previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    /// Creates a store writing to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn ensure_parent_dir(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    CacheError::persistence(format!(
                        "Failed to create snapshot directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Parses the file contents record by record
    fn parse(&self, contents: &str) -> Result<LoadedSnapshot, CacheError> {
        if contents.trim().is_empty() {
            return Ok(LoadedSnapshot::default());
        }

        let document: serde_json::Value = serde_json::from_str(contents).map_err(|e| {
            CacheError::persistence(format!(
                "Snapshot {} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        let serde_json::Value::Array(items) = document else {
            return Err(CacheError::persistence(format!(
                "Snapshot {} is not a JSON array",
                self.path.display()
            )));
        };

        let mut snapshot = LoadedSnapshot::default();

        for (index, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<PersistedEntry>(item) {
                Ok(record) => snapshot.records.push(record),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed snapshot record");
                    snapshot.malformed += 1;
                }
            }
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save(&self, records: &[PersistedEntry]) -> Result<(), CacheError> {
        self.ensure_parent_dir().await?;

        let json_data = serde_json::to_string_pretty(records).map_err(|e| {
            CacheError::serialization(format!("Failed to serialize snapshot: {}", e))
        })?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, json_data).await.map_err(|e| {
            CacheError::persistence(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            CacheError::persistence(format!(
                "Failed to move snapshot into {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn load(&self) -> Result<LoadedSnapshot, CacheError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedSnapshot::default());
            }
            Err(e) => {
                return Err(CacheError::persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        self.parse(&contents)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::persistence(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
