//! Unified error type for authkeep.

use authkeep_protocol::ProtocolError;
use authkeep_session::SessionError;
use authkeep_storage::StorageError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `authkeep` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum AuthkeepError {
    /// Durable storage failed (bad key, I/O).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The persisted snapshot couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session store refused an operation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Environment configuration is missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client couldn't be built.
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_storage_error() {
        let err = StorageError::InvalidKey("../x".into());
        let authkeep_err: AuthkeepError = err.into();
        assert!(matches!(authkeep_err, AuthkeepError::Storage(_)));
        assert!(authkeep_err.to_string().contains("../x"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::Invalid("bad".into());
        let authkeep_err: AuthkeepError = err.into();
        assert!(matches!(authkeep_err, AuthkeepError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let authkeep_err: AuthkeepError = SessionError::AlreadyHydrated.into();
        assert!(matches!(authkeep_err, AuthkeepError::Session(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err = ConfigError::Missing {
            var: "AUTHKEEP_API_BASE_URL".into(),
        };
        let authkeep_err: AuthkeepError = err.into();
        assert!(matches!(authkeep_err, AuthkeepError::Config(_)));
        assert!(authkeep_err.to_string().contains("AUTHKEEP_API_BASE_URL"));
    }
}
