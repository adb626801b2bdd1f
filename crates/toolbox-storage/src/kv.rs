//! Key/value stores
//!
//! [`KeyValueStore`] is the durable-storage contract used by the rest of the
//! workspace: string keys, string values, synchronous writes. Typed access
//! goes through [`KeyValueStoreExt`], which encodes values as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::json_store::{load_json, save_json_atomic};

/// File name of the key/value document inside a data directory
const STORE_FILENAME: &str = "storage.json";

/// Durable string key/value storage
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// JSON-encoded access on top of any [`KeyValueStore`]
pub trait KeyValueStoreExt {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>>;
    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::InvalidValue {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::InvalidValue {
            key: key.to_string(),
            source,
        })?;
        self.set(key, &raw)
    }
}

/// In-memory store, lost on drop
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// File-backed store keeping every key in a single JSON object
///
/// The whole document is rewritten atomically on each mutation, so readers
/// opening the same path later always see a complete record.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let entries: BTreeMap<String, String> = load_json(&path)?.unwrap_or_default();
        debug!("Opened key/value store at {:?} ({} keys)", path, entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Store document in `dir`, used when the data directory is configured
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(STORE_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = save_json_atomic(&self.path, &*entries) {
            // keep memory and disk in agreement
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock();
        if let Some(old) = entries.remove(key) {
            if let Err(e) = save_json_atomic(&self.path, &*entries) {
                entries.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }
}
