use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One camera's last-known recording, keyed in the snapshot by resolved
/// camera name. Source of truth for skip-download decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub recording_id: String,
    pub timestamp: String,
    pub event_type: String,
    pub duration: String,
    pub path: String,
}

/// Everything the engine persists between cycles, rewritten wholesale
/// after each successful cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub last_update: Option<String>,
    #[serde(default)]
    pub recordings: BTreeMap<String, String>,
    #[serde(default)]
    pub snapshots: BTreeMap<String, String>,
    #[serde(default)]
    pub animated: BTreeMap<String, String>,
    #[serde(default)]
    pub recording_cache: BTreeMap<String, CacheEntry>,
}

/// Flat JSON file under `<storage>/metadata/recordings.json`.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted snapshot, degrading to an empty one on a
    /// missing or unreadable file so a cold start is never fatal.
    pub fn load(&self) -> MetadataSnapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(path = %self.path.display(), "no metadata file, starting cold");
                MetadataSnapshot::default()
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "metadata unreadable, starting cold");
                MetadataSnapshot::default()
            }
        }
    }

    pub fn try_load(&self) -> StoreResult<Option<MetadataSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Writes via a sibling temp file and rename so a crash mid-write
    /// never leaves a truncated metadata file behind.
    pub fn save(&self, snapshot: &MetadataSnapshot) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let staging = self.path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&staging, contents).map_err(|source| StoreError::Io {
            path: staging.clone(),
            source,
        })?;
        std::fs::rename(&staging, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_an_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata/recordings.json"));
        let snapshot = store.load();
        assert!(snapshot.last_update.is_none());
        assert!(snapshot.recording_cache.is_empty());
    }

    #[test]
    fn corrupt_file_loads_as_an_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordings.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let snapshot = MetadataStore::new(&path).load();
        assert!(snapshot.recordings.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata/recordings.json"));

        let mut snapshot = MetadataSnapshot {
            last_update: Some("2024-01-10T10:00:00+00:00".to_string()),
            ..Default::default()
        };
        snapshot
            .recordings
            .insert("Driveway".to_string(), "/store/driveway_latest.mp4".into());
        snapshot.recording_cache.insert(
            "Driveway".to_string(),
            CacheEntry {
                recording_id: "0_10:00:00_0:00:05".to_string(),
                timestamp: "10:00:00".to_string(),
                event_type: "Person".to_string(),
                duration: "0:00:05".to_string(),
                path: "/store/driveway_latest.mp4".to_string(),
            },
        );
        store.save(&snapshot).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.last_update, snapshot.last_update);
        assert_eq!(
            loaded.recording_cache.get("Driveway").unwrap().recording_id,
            "0_10:00:00_0:00:05"
        );
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn older_snapshots_without_optional_maps_still_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordings.json");
        std::fs::write(
            &path,
            br#"{ "last_update": "2024-01-01T00:00:00+00:00", "recordings": {} }"#,
        )
        .unwrap();
        let snapshot = MetadataStore::new(&path).load();
        assert!(snapshot.snapshots.is_empty());
        assert!(snapshot.animated.is_empty());
    }
}
