use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;

use crate::error::ChatStoreError;
use crate::paths::validate_key;

/// Byte-oriented key-value store with a flat string namespace.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ChatStoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), ChatStoreError>;

    /// Removes `key`. Returns whether a value was present.
    fn delete(&self, key: &str) -> Result<bool, ChatStoreError>;

    /// Lists every key, sorted.
    fn keys(&self) -> Result<Vec<String>, ChatStoreError>;
}

/// Store backed by one file per key inside a directory.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so readers never observe a half-written value.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens an existing store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ChatStoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ChatStoreError::MissingStoreDirectory { path: root });
        }
        Ok(Self { root })
    }

    /// Opens the store directory, creating it when missing.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, ChatStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|source| ChatStoreError::io("creating store directory", &root, source))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ChatStoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl KeyValueStore for DirectoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ChatStoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ChatStoreError::io("reading store value", path, source)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ChatStoreError> {
        let path = self.path_for(key)?;
        let mut tmp = NamedTempFile::new_in(&self.root)
            .map_err(|source| ChatStoreError::io("creating temporary file", &self.root, source))?;

        tmp.write_all(value)
            .map_err(|source| ChatStoreError::io("writing temporary file", tmp.path(), source))?;
        tmp.as_file()
            .sync_all()
            .map_err(|source| ChatStoreError::io("syncing temporary file", tmp.path(), source))?;

        tmp.persist(&path).map_err(|err| ChatStoreError::Persist {
            path: path.clone(),
            source: err.error,
        })?;

        tracing::debug!(key, bytes = value.len(), root = %self.root.display(), "stored value");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, ChatStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ChatStoreError::io("deleting store value", path, source)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, ChatStoreError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|source| ChatStoreError::io("listing store directory", &self.root, source))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| {
                ChatStoreError::io("listing store directory", &self.root, source)
            })?;
            let is_file = entry
                .file_type()
                .map_err(|source| ChatStoreError::io("inspecting store entry", entry.path(), source))?
                .is_file();
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_key(name).is_ok() {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// Volatile store used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ChatStoreError> {
        validate_key(key)?;
        Ok(lock_unpoisoned(&self.entries).get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ChatStoreError> {
        validate_key(key)?;
        lock_unpoisoned(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, ChatStoreError> {
        validate_key(key)?;
        Ok(lock_unpoisoned(&self.entries).remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, ChatStoreError> {
        Ok(lock_unpoisoned(&self.entries).keys().cloned().collect())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
