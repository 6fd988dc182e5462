//! Error types for the session layer.

use authkeep_protocol::ProtocolError;
use authkeep_storage::StorageError;

/// Errors that can occur while operating the session store.
///
/// Mutations update the in-memory session before persisting it, so a
/// `Storage` error from a setter means "the change is live but may not
/// survive a restart"; the next start's reconciliation handles the skew.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Durable storage refused a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The snapshot couldn't be encoded for persistence.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `hydrate()` was called a second time. Restoration happens exactly
    /// once per store.
    #[error("session store already hydrated")]
    AlreadyHydrated,

    /// An operation that needs restored state ran before `hydrate()`.
    #[error("session store not hydrated yet")]
    NotHydrated,
}

/// Why fetching the current user's profile failed.
///
/// The variants let callers tell "the backend says this credential is no
/// longer good" apart from "we couldn't reach the backend". Whether they
/// act on the difference is their policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The backend rejected the token (expired, revoked, malformed).
    #[error("credential rejected: {0}")]
    Unauthorized(String),

    /// The request never produced a usable answer: connection refused,
    /// timeout, 5xx, and so on.
    #[error("profile request failed: {0}")]
    Transport(String),

    /// The backend answered, but not with a user record.
    #[error("invalid profile response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Returns `true` if the backend positively rejected the credential.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Returns `true` if retrying the same request could plausibly work.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
