/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key can't be used by this backend (empty, or it would escape
    /// the storage root).
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Reading a slot failed.
    #[error("read of {key:?} failed: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a slot failed.
    #[error("write of {key:?} failed: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Removing a slot failed.
    #[error("remove of {key:?} failed: {source}")]
    Remove {
        key: String,
        #[source]
        source: std::io::Error,
    },
}
