//! Error types for the protocol layer.
//!
//! Each crate in authkeep defines its own error enum. A `ProtocolError`
//! always means the bytes were wrong (couldn't be produced, couldn't be
//! parsed, or parsed into something we don't accept), never that storage
//! or the network misbehaved.

/// Errors that can occur while encoding or decoding session records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: a snapshot written by a different client build,
    /// truncated files, or hand-edited storage.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The persisted envelope carries a format version this build
    /// doesn't understand.
    #[error("unsupported persisted version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The value decoded but breaks a rule of the format.
    #[error("invalid record: {0}")]
    Invalid(String),
}
