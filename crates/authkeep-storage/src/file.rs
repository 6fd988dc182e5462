//! File-backed storage using `tokio::fs`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{validate_key, DurableStorage, StorageError};

/// Counter for unique temp-file suffixes within this process.
static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

/// A [`DurableStorage`] that keeps each slot in its own file under `root`.
///
/// Writes go to a temp file next to the target and are renamed into
/// place, so a reader sees either the old value or the new one, never a
/// torn write. Two different slots can still disagree after a crash; that
/// is what session reconciliation is for.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Opens (creating if needed) a storage directory at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|source| {
            StorageError::Write {
                key: root.display().to_string(),
                source,
            }
        })?;
        tracing::debug!(root = %root.display(), "file storage opened");
        Ok(Self { root })
    }

    /// The directory holding the slot files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl DurableStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.slot_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        let temp = self.root.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed)
        ));

        let write_err = |source| StorageError::Write {
            key: key.to_string(),
            source,
        };

        tokio::fs::write(&temp, value).await.map_err(write_err)?;
        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(write_err(source));
        }

        tracing::trace!(key, bytes = value.len(), "file slot written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove {
                key: key.to_string(),
                source,
            }),
        }
    }
}
