//! In-memory save store.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use worker::storage::{SaveStore, StorageError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A save store keeping everything in a map.
#[derive(Default)]
pub struct MemorySaveStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySaveStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed stored state under `key`.
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        lock(&self.entries).insert(key.into(), bytes.into());
    }

    /// The bytes stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).get(key).cloned()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// True when nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl SaveStore for MemorySaveStore {
    fn save(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let bytes = fs::read(path)?;
        lock(&self.entries).insert(key.to_string(), bytes);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        lock(&self.entries)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
