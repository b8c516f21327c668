//! Save-state persistence collaborator interface.
//!
//! Rooms persist emulator save files through this narrow seam. The directory
//! store below is what the binary wires in; anything cloud-shaped lives
//! behind the same trait elsewhere.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by a save store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No stored state under this key.
    #[error("no saved state for key {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Keyed persistence for save-state files.
pub trait SaveStore: Send + Sync {
    /// Persist the file at `path` under `key`.
    fn save(&self, key: &str, path: &Path) -> Result<(), StorageError>;

    /// Fetch the bytes stored under `key`.
    fn load(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Directory-backed save store: one file per key.
pub struct DirSaveStore {
    root: PathBuf,
}

impl DirSaveStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.save"))
    }
}

impl SaveStore for DirSaveStore {
    fn save(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let bytes = fs::read(path)?;
        fs::write(self.entry(key), bytes)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let entry = self.entry(key);
        if !entry.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(fs::read(entry)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("arcadia-store-{tag}-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let root = temp_root("rt");
        let store = DirSaveStore::open(&root).unwrap();

        let state = root.join("local.state");
        fs::write(&state, b"snapshot").unwrap();

        store.save("room-1", &state).unwrap();
        assert_eq!(store.load("room-1").unwrap(), b"snapshot");
    }

    #[test]
    fn test_load_missing_key() {
        let store = DirSaveStore::open(temp_root("missing")).unwrap();
        assert!(matches!(
            store.load("nope"),
            Err(StorageError::NotFound(_))
        ));
    }
}
