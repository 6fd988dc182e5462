//! Durable client storage for authkeep.
//!
//! Provides the [`DurableStorage`] trait: a tiny key-value contract that
//! the session store persists itself through. Think of it as the Rust side
//! of the browser's `localStorage`: a handful of named slots holding bytes
//! that survive a restart.
//!
//! # Feature Flags
//!
//! - `file` (default): [`FileStorage`], one file per key on local disk
//!
//! [`MemoryStorage`] is always available and is what the test suites use.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "file")]
mod file;
mod memory;

pub use error::StorageError;
#[cfg(feature = "file")]
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// A key-value store that outlives the process.
///
/// Implementations must treat each key as an independent slot: writing one
/// key never touches another. The session store relies on this to keep
/// the serialized snapshot and the raw token slot separately, so a partial
/// write leaves one of them behind and reconciliation can repair it.
///
/// # Trait bounds
///
/// - `Send + Sync` → a storage handle is shared by the store, the
///   bootstrapper and the background refresher.
/// - `'static` → the handle lives as long as the client does.
pub trait DurableStorage: Send + Sync + 'static {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been stored there.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, StorageError>>
           + Send;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Removes whatever is stored under `key`.
    ///
    /// Removing a key that holds nothing is not an error.
    fn remove(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}

/// Rejects keys that can't safely name a slot.
///
/// Every backend applies the same rules so that a key accepted by
/// `MemoryStorage` in tests is also accepted by `FileStorage` in
/// production.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_plain_names() {
        assert!(validate_key("auth-storage").is_ok());
        assert!(validate_key("token").is_ok());
        assert!(validate_key("v1.session").is_ok());
    }

    #[test]
    fn test_validate_key_rejects_empty() {
        assert!(matches!(
            validate_key(""),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_validate_key_rejects_path_escapes() {
        for key in [".", "..", "a/b", "..\\x", "nul\0byte"] {
            assert!(
                matches!(validate_key(key), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }
}
