use std::fs;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// File-backed key-value store standing in for browser local storage.
///
/// Each key is one JSON file under the store directory. Values are read
/// leniently: a missing or corrupt file reads as "no value". There is no
/// cross-process locking; concurrent writers race and the last writer wins,
/// which is acceptable for the single-user design target.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Opens the store at the platform-default data directory.
    pub fn open() -> AppResult<Self> {
        let dirs = directories::ProjectDirs::from("com", "clayminds", "clayminds")
            .ok_or_else(|| AppError::Config("could not resolve a data directory".into()))?;
        Self::at(dirs.data_dir().to_path_buf())
    }

    /// Opens the store at an explicit directory (tests point this at a temp dir).
    pub fn at(dir: PathBuf) -> AppResult<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let content = fs::read_to_string(self.key_path(key)).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding corrupt local value");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let content = serde_json::to_string(value)?;
        fs::write(self.key_path(key), content)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.key_path(key));
    }

    /// Removes every persisted value. Used by reset-to-master, which must not
    /// let tombstones or cached overrides outlive a deliberate fresh start.
    pub fn clear(&self) -> AppResult<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::at(dir.path().to_path_buf()).unwrap();
        (dir, store)
    }

    #[test]
    fn set_get_roundtrip() {
        let (_dir, store) = temp_store();
        store.set("answer", &vec!["a".to_string(), "b".to_string()]).unwrap();
        let values: Vec<String> = store.get("answer").unwrap();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn missing_key_reads_as_none() {
        let (_dir, store) = temp_store();
        assert!(store.get::<Vec<String>>("nothing").is_none());
    }

    #[test]
    fn corrupt_value_reads_as_none() {
        let (_dir, store) = temp_store();
        std::fs::write(store.key_path("bad"), "{not json").unwrap();
        assert!(store.get::<Vec<String>>("bad").is_none());
    }

    #[test]
    fn clear_removes_every_key() {
        let (_dir, store) = temp_store();
        store.set("one", &1u32).unwrap();
        store.set("two", &2u32).unwrap();
        store.clear().unwrap();
        assert!(store.get::<u32>("one").is_none());
        assert!(store.get::<u32>("two").is_none());
    }
}
