//! Key record persistence.
//!
//! The whole record set lives in one JSON file mapping key identifier to
//! record. Every operation reads the full mapping and every mutation
//! writes the full mapping back; there are no partial or streaming
//! updates. The [`KeyRepository`] trait keeps `KeyService` independent of
//! that layout so an embedded transactional store could be swapped in
//! later without touching the lifecycle logic.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::models::key::KeyMap;

/// Whole-set persistence for key records.
///
/// # Read Leniency
///
/// `load` is infallible by design: a missing or unparseable store reads
/// as an empty mapping, so a corrupt file degrades the service to "no
/// keys" instead of taking it down. Only writes can fail.
pub trait KeyRepository: Send + Sync {
    /// Load the full record set.
    fn load(&self) -> KeyMap;

    /// Persist the full record set, replacing whatever was stored.
    fn save(&self, keys: &KeyMap) -> io::Result<()>;
}

/// JSON-file-backed repository.
///
/// The file is created with an empty mapping on construction if it does
/// not exist yet, so first use never hits the missing-file path.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Open (or create) the store file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self { path: path.into() };
        if !store.path.exists() {
            store.save(&KeyMap::new())?;
        }
        Ok(store)
    }
}

impl KeyRepository for JsonFileStore {
    fn load(&self) -> KeyMap {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Store file unreadable, treating as empty");
                return KeyMap::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Store file corrupt, treating as empty");
                KeyMap::new()
            }
        }
    }

    fn save(&self, keys: &KeyMap) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(keys).map_err(io::Error::other)?;
        fs::write(&self.path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::key::{KeyRecord, Plan};
    use chrono::NaiveDate;

    #[test]
    fn creates_empty_store_file_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let store = JsonFileStore::new(&path).unwrap();
        assert!(path.exists());
        assert!(store.load().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(&path, "{ not json at all").unwrap();

        let store = JsonFileStore::new(&path).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn saved_records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let now = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let mut keys = KeyMap::new();
        keys.insert("KEY1".to_string(), KeyRecord::new(Plan::Weekly, now));

        JsonFileStore::new(&path).unwrap().save(&keys).unwrap();

        let reopened = JsonFileStore::new(&path).unwrap();
        let loaded = reopened.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["KEY1"].plan, Plan::Weekly);
        assert_eq!(loaded["KEY1"].expire_at, now + chrono::Duration::weeks(1));
    }
}
