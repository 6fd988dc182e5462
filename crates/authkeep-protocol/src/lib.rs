//! Session records and persisted format for authkeep.
//!
//! This crate defines what a session looks like at rest:
//!
//! - **Types** ([`User`], [`SessionSnapshot`], [`PersistedSession`]):
//!   the records written to durable storage and returned by the backend's
//!   profile endpoint.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those records are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! # Architecture
//!
//! ```text
//! Storage (bytes) → Protocol (SessionSnapshot) → Session (live store)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    PersistedSession, Role, SessionSnapshot, User, UserId, PERSIST_VERSION,
};
