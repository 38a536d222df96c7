//! Key-value storage for session state.
//!
//! The viewer never talks to a settings backend directly; it reads and
//! writes JSON values through [`KeyValueStore`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors from a key-value backend.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// I/O error reading or writing the backing file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backing file is not a JSON object
    #[error("Settings file {path:?} does not hold a JSON object")]
    NotAnObject {
        /// File that was read
        path: PathBuf,
    },

    /// A stored value has the wrong shape for its key
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Key whose value was rejected
        key: String,
        /// What was wrong with it
        message: String,
    },
}

impl PersistenceError {
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// An opaque store of JSON values by key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str) -> Option<Value>;

    /// Persist pending writes. In-memory backends have nothing to do.
    fn flush(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Read `key` as `T`. Absent keys give `Ok(None)`.
pub fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, PersistenceError> {
    match store.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| PersistenceError::invalid_value(key, e.to_string())),
    }
}

/// Write `value` under `key`.
pub fn set_typed<T: Serialize>(
    store: &mut dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    store.set(key, serde_json::to_value(value)?);
    Ok(())
}

/// Store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

/// Store backed by a single JSON object file. Writes are buffered until
/// [`KeyValueStore::flush`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: MemoryStore,
    dirty: bool,
}

impl JsonFileStore {
    /// Open `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let mut values = MemoryStore::new();

        if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&json)? {
                Value::Object(map) => {
                    for (key, value) in map {
                        values.set(&key, value);
                    }
                }
                _ => return Err(PersistenceError::NotAnObject { path }),
            }
            log::debug!("Loaded {} settings from {:?}", values.len(), path);
        } else {
            log::debug!("No settings file at {:?}, starting empty", path);
        }

        Ok(Self {
            path,
            values,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether there are writes not yet flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.set(key, value);
        self.dirty = true;
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    fn flush(&mut self) -> Result<(), PersistenceError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let object: serde_json::Map<String, Value> = self
            .values
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        std::fs::write(&self.path, serde_json::to_string_pretty(&object)?)?;
        self.dirty = false;
        log::info!("Saved {} settings to {:?}", object.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("last_zoom"), None);
        store.set("last_zoom", json!(150));
        assert_eq!(store.get("last_zoom"), Some(json!(150)));
        assert_eq!(store.remove("last_zoom"), Some(json!(150)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_typed_access() {
        let mut store = MemoryStore::new();
        set_typed(&mut store, "enhanced_mode", &true).unwrap();
        assert_eq!(get_typed::<bool>(&store, "enhanced_mode").unwrap(), Some(true));
        assert_eq!(get_typed::<bool>(&store, "missing").unwrap(), None);

        store.set("last_zoom", json!("big"));
        assert!(matches!(
            get_typed::<u32>(&store, "last_zoom"),
            Err(PersistenceError::InvalidValue { key, .. }) if key == "last_zoom"
        ));
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("settings.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert!(!store.is_dirty());
        store.set("contrast_mode", json!(3));
        store.set("saved_positions", json!({"a": {"zoom": 200}}));
        assert!(store.is_dirty());
        store.flush().unwrap();
        assert!(!store.is_dirty());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("contrast_mode"), Some(json!(3)));
        assert_eq!(
            reopened.get("saved_positions"),
            Some(json!({"a": {"zoom": 200}}))
        );
    }

    #[test]
    fn test_json_file_store_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(PersistenceError::NotAnObject { .. })
        ));
    }
}
