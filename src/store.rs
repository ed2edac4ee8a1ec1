//! Key-value persistence for conversations and reports.
//!
//! Everything the service remembers between requests goes through a
//! [`KeyValueStore`] injected at startup; there is no implicit global storage.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Minimal string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(store.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let len = value.len();
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        store.insert(key.to_string(), value);
        tracing::debug!("MemoryStore: stored '{}' ({} bytes)", key, len);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        store.remove(key);
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) the store directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory: {:?}", dir))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).with_context(|| format!("Failed to write {:?}", tmp))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {:?}", path))?;
        tracing::debug!("JsonFileStore: stored '{}' at {:?}", key, path);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1".to_string()).unwrap();
        let shared = store.clone();
        assert_eq!(shared.get("k").unwrap().as_deref(), Some("v1"));

        store.delete("k").unwrap();
        assert_eq!(shared.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested")).unwrap();

        store.set("current_report", r#"{"a":1}"#.to_string()).unwrap();
        let reopened = JsonFileStore::open(dir.path().join("nested")).unwrap();
        assert_eq!(reopened.get("current_report").unwrap().as_deref(), Some(r#"{"a":1}"#));

        reopened.delete("current_report").unwrap();
        reopened.delete("current_report").unwrap();
        assert_eq!(store.get("current_report").unwrap(), None);
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store.set("../escape", "x".to_string()).unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }
}
