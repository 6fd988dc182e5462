//! Session records and the persisted envelope.
//!
//! These are the structures that get written to durable storage and read
//! back on the next start, plus the user record the backend's profile
//! endpoint returns. Field names on the wire are camelCase so a snapshot
//! written by the browser build of the client reads the same here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ProtocolError;

/// The persisted format version this build reads and writes.
pub const PERSIST_VERSION: u32 = 0;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A user's identifier as issued by the backend.
///
/// Backends disagree on whether ids are numbers or strings, so both are
/// accepted on input and the id is always written back as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(de)? {
            Raw::Text(s) => UserId(s),
            Raw::Signed(n) => UserId(n.to_string()),
            Raw::Unsigned(n) => UserId(n.to_string()),
        })
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a user is allowed to do on the platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Returns `true` for accounts that can open the admin dashboards.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// The current user's record, as returned by the profile endpoint.
///
/// Only the identity fields are required. Profile and billing fields the
/// client shows directly are typed; anything else the backend sends lands
/// in `extra` so it survives a persist/restore cycle untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Account credit balance, in the platform's billing unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl User {
    /// Builds a plain `user`-role record with no profile fields.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            username: username.into(),
            role: Role::User,
            email: None,
            avatar: None,
            balance: None,
            extra: BTreeMap::new(),
        }
    }

    /// Same record with the given role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// The persisted subset of session state: `{user, token, isAuthenticated}`.
///
/// `is_authenticated` is a cached flag, not a computed one. Every field is
/// `#[serde(default)]` so a snapshot missing a field (an older or partial
/// write) still loads, with the gap left for reconciliation to repair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl SessionSnapshot {
    /// No user, no token, not authenticated.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if all three fields are cleared.
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.token.is_none() && !self.is_authenticated
    }

    /// Returns `true` if the cached flag agrees with the token, which is
    /// what consumers are allowed to assume once reconciliation has run.
    pub fn is_consistent(&self) -> bool {
        self.is_authenticated == self.token.is_some()
    }
}

// ---------------------------------------------------------------------------
// PersistedSession
// ---------------------------------------------------------------------------

/// The envelope written under the store's namespace key.
///
/// ```text
/// {"state": {"user": …, "token": …, "isAuthenticated": …}, "version": 0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub state: SessionSnapshot,
    #[serde(default)]
    pub version: u32,
}

impl PersistedSession {
    /// Wraps a snapshot at the current format version.
    pub fn new(state: SessionSnapshot) -> Self {
        Self {
            state,
            version: PERSIST_VERSION,
        }
    }

    /// Unwraps the snapshot, refusing versions this build can't read.
    pub fn into_snapshot(self) -> Result<SessionSnapshot, ProtocolError> {
        if self.version != PERSIST_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                found: self.version,
                supported: PERSIST_VERSION,
            });
        }
        Ok(self.state)
    }
}
