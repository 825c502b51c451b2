//! Preference store implementations.

use crate::paths::MarginaliaPaths;
use crate::storage::AtomicTomlFile;
use marginalia_core::error::{MarginaliaError, Result};
use marginalia_core::preference::PreferenceStore;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local store. Used in tests and when the host persists nothing.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        lock(&store.values).insert(key.to_string(), value.to_string());
        store
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Preferences kept as a flat TOML table, written through on every `set`.
pub struct FilePreferenceStore {
    file: AtomicTomlFile<BTreeMap<String, String>>,
    cache: Mutex<BTreeMap<String, String>>,
}

impl FilePreferenceStore {
    /// Opens the store at the default location.
    pub fn open_default() -> Result<Self> {
        let path = MarginaliaPaths::preferences_file()
            .map_err(|e| MarginaliaError::config(e.to_string()))?;
        Self::open(path)
    }

    /// Opens the store at `path`. A missing file starts empty.
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = AtomicTomlFile::new(path);
        let cache = file.load()?.unwrap_or_default();
        Ok(Self {
            file,
            cache: Mutex::new(cache),
        })
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.cache).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = lock(&self.cache);
        let previous = cache.insert(key.to_string(), value.to_string());
        if let Err(e) = self.file.save(&cache) {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => cache.insert(key.to_string(), previous),
                None => cache.remove(key),
            };
            tracing::error!("[Preferences] Failed to persist {}: {}", key, e);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_core::preference::{TEXT_SIZE_KEY, TextSize, load_text_size, save_text_size};
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryPreferenceStore::new();
        assert_eq!(load_text_size(&store), TextSize::Medium);
        save_text_size(&store, TextSize::Large).unwrap();
        assert_eq!(store.get(TEXT_SIZE_KEY).as_deref(), Some("large"));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.toml");

        let store = FilePreferenceStore::open(path.clone()).unwrap();
        save_text_size(&store, TextSize::XLarge).unwrap();

        let reopened = FilePreferenceStore::open(path).unwrap();
        assert_eq!(load_text_size(&reopened), TextSize::XLarge);
    }

    #[test]
    fn test_file_store_invalid_value_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "panel_text_size = \"enormous\"\n").unwrap();

        let store = FilePreferenceStore::open(path).unwrap();
        assert_eq!(load_text_size(&store), TextSize::Medium);
    }
}
