//! Codec trait and implementations for serializing persisted records.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The session store doesn't care HOW its snapshot is serialized, it just
//! needs something that implements [`Codec`]. Storage only ever sees the
//! resulting bytes.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → the codec is shared by the store and every task that
///   mutates it.
/// - `'static` → it owns everything it needs, so it can live inside the
///   long-lived store.
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the decoded value
/// doesn't borrow from the input bytes, so the read buffer can be dropped
/// right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented
    /// in this format.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps the persisted snapshot readable: you can open the storage
/// file (or the browser's storage panel) and see exactly which user and
/// token the client believes it has.
///
/// ## Example
///
/// ```rust
/// use authkeep_protocol::{Codec, JsonCodec, PersistedSession, SessionSnapshot};
///
/// let codec = JsonCodec;
/// let persisted = PersistedSession::new(SessionSnapshot::empty());
///
/// let bytes = codec.encode(&persisted).unwrap();
/// let decoded: PersistedSession = codec.decode(&bytes).unwrap();
/// assert_eq!(persisted, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
