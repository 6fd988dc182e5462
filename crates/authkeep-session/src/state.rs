//! Pure session state transitions.
//!
//! Everything in this module is a plain function of "old state + input →
//! new state + what storage should do". Nothing here touches storage or
//! the clock, which is what lets the rules be tested without a runtime.
//! [`SessionStore`](crate::SessionStore) is the part that applies the
//! results.

use authkeep_protocol::{SessionSnapshot, User};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Where the session lives in durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Namespace key for the serialized `{user, token, isAuthenticated}`
    /// snapshot.
    ///
    /// Default: `"auth-storage"`.
    pub storage_key: String,

    /// Key for the raw token slot, kept separately so reconciliation can
    /// cross-check it against the snapshot.
    ///
    /// Default: `"token"`.
    pub token_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: "auth-storage".to_string(),
            token_key: "token".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions and transitions
// ---------------------------------------------------------------------------

/// Every way a caller can mutate the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Replace `user`. The flag becomes "user present", except that a
    /// held token keeps it on when the user is cleared.
    SetUser(Option<User>),
    /// Replace `token`. The flag follows the token.
    SetToken(Option<String>),
    /// Set all three fields at once after login or registration.
    Login { user: User, token: String },
    /// Clear all three fields.
    Logout,
}

impl SessionAction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetUser(_) => "set_user",
            Self::SetToken(_) => "set_token",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
        }
    }
}

/// What should happen to the raw token slot alongside a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSlotOp {
    /// Leave the slot alone.
    Keep,
    /// Store this token in the slot.
    Write(String),
    /// Empty the slot.
    Remove,
}

/// The result of applying a [`SessionAction`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The session after the action.
    pub next: SessionSnapshot,
    /// The matching token slot side effect.
    pub slot: TokenSlotOp,
}

/// Computes the session that results from `action`.
///
/// Each action replaces its target field(s) wholesale and recomputes the
/// cached flag in the same step, so no caller ever observes a half-applied
/// update.
pub fn apply(current: &SessionSnapshot, action: SessionAction) -> Transition {
    match action {
        SessionAction::SetUser(user) => {
            // A held token still counts when the user is cleared.
            let is_authenticated = user.is_some() || current.token.is_some();
            Transition {
                next: SessionSnapshot {
                    user,
                    token: current.token.clone(),
                    is_authenticated,
                },
                slot: TokenSlotOp::Keep,
            }
        }
        SessionAction::SetToken(token) => {
            let slot = match &token {
                Some(t) => TokenSlotOp::Write(t.clone()),
                None => TokenSlotOp::Remove,
            };
            Transition {
                next: SessionSnapshot {
                    user: current.user.clone(),
                    is_authenticated: token.is_some(),
                    token,
                },
                slot,
            }
        }
        SessionAction::Login { user, token } => Transition {
            slot: TokenSlotOp::Write(token.clone()),
            next: SessionSnapshot {
                user: Some(user),
                token: Some(token),
                is_authenticated: true,
            },
        },
        SessionAction::Logout => Transition {
            next: SessionSnapshot::empty(),
            slot: TokenSlotOp::Remove,
        },
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// One repair made by the reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    /// The token slot had a token the snapshot lacked; adopted into memory.
    AdoptedSlotToken,
    /// The snapshot had a token the slot lacked; written to the slot.
    MirroredTokenToSlot,
    /// Both had a token and they differed; the snapshot's value won and
    /// was written over the slot.
    OverwroteSlotToken,
    /// A token was present but the flag was off; flag forced on.
    ForcedAuthenticated,
    /// No token but the flag was on; flag cleared.
    ClearedAuthenticated,
}

/// Outcome of [`reconcile`]: the repaired session plus what to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub snapshot: SessionSnapshot,
    /// Token to write to the slot, if the slot needs repairing.
    pub slot_write: Option<String>,
    pub repairs: Vec<Repair>,
}

impl Reconciliation {
    /// Returns `true` if the pass found nothing to fix.
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    /// Returns `true` if the in-memory snapshot changed and must be
    /// persisted again.
    pub fn snapshot_changed(&self) -> bool {
        self.repairs.iter().any(|r| {
            matches!(
                r,
                Repair::AdoptedSlotToken
                    | Repair::ForcedAuthenticated
                    | Repair::ClearedAuthenticated
            )
        })
    }
}

/// Aligns the restored snapshot with the raw token slot.
///
/// Rules, in order:
///
/// 1. Slot has a token, snapshot doesn't → adopt the slot's token.
/// 2. Snapshot has a token, slot doesn't → write it to the slot.
/// 3. Both have tokens that differ → the snapshot wins (it is always
///    persisted before the slot, so it is never the older of the two).
/// 4. Token present → flag on, even with no user yet. Token absent →
///    flag off.
///
/// Running it on its own output reports no repairs.
pub fn reconcile(
    current: &SessionSnapshot,
    slot_token: Option<&str>,
) -> Reconciliation {
    let mut snapshot = current.clone();
    let mut repairs = Vec::new();
    let mut slot_write = None;

    let held_token = snapshot.token.clone();
    match (held_token.as_deref(), slot_token) {
        (None, Some(stored)) => {
            snapshot.token = Some(stored.to_string());
            repairs.push(Repair::AdoptedSlotToken);
        }
        (Some(held), None) => {
            slot_write = Some(held.to_string());
            repairs.push(Repair::MirroredTokenToSlot);
        }
        (Some(held), Some(stored)) if held != stored => {
            slot_write = Some(held.to_string());
            repairs.push(Repair::OverwroteSlotToken);
        }
        _ => {}
    }

    match (snapshot.token.is_some(), snapshot.is_authenticated) {
        (true, false) => {
            snapshot.is_authenticated = true;
            repairs.push(Repair::ForcedAuthenticated);
        }
        (false, true) => {
            snapshot.is_authenticated = false;
            repairs.push(Repair::ClearedAuthenticated);
        }
        _ => {}
    }

    Reconciliation {
        snapshot,
        slot_write,
        repairs,
    }
}
