//! The persisted session store: the live, shared copy of the session.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Holding `{user, token, isAuthenticated}` for the client's lifetime
//! - Persisting that subset on every mutation
//! - Restoring it once at start-up (hydration) and reconciling the
//!   restored copy against the raw token slot
//! - Telling consumers when any of it changes
//!
//! # Concurrency note
//!
//! Mutations can arrive from several independent async completions (the
//! bootstrapper, the background refresher, UI handlers). Each one takes
//! the writer lock, computes its transition, publishes it and persists it
//! before releasing, so transitions are applied one at a time and storage
//! sees writes in the same order the session changed.
//!
//! Readers never take the lock: they read the latest published snapshot
//! from a `watch` channel.

use authkeep_protocol::{
    Codec, JsonCodec, PersistedSession, SessionSnapshot, User,
};
use authkeep_storage::DurableStorage;
use tokio::sync::{watch, Mutex};

use crate::state::{apply, reconcile, Repair, SessionAction, TokenSlotOp};
use crate::{SessionConfig, SessionError};

/// What hydration found and fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationReport {
    /// `true` if a persisted snapshot was found and installed.
    pub restored: bool,
    /// `true` if a snapshot existed but couldn't be read and was ignored.
    pub discarded: bool,
    /// Repairs made by the reconciliation pass that followed.
    pub repairs: Vec<Repair>,
}

/// The single source of truth for identity and credential state.
///
/// Construct one per client, wrap it in an `Arc`, and hand clones to
/// whatever needs to read or change the session. Nothing is global.
///
/// ## Lifecycle
///
/// ```text
/// new() ──→ [unhydrated] ──hydrate()──→ [hydrated] ──login()/set_*()──→ …
///                                            │
///                                         logout() ──→ empty session
/// ```
pub struct SessionStore<S: DurableStorage, C: Codec = JsonCodec> {
    storage: S,
    codec: C,
    config: SessionConfig,

    /// Writer lock. Holds the authoritative session; every mutation goes
    /// through it.
    writer: Mutex<SessionSnapshot>,

    /// Latest published session, for lock-free reads and change
    /// notification.
    state: watch::Sender<SessionSnapshot>,

    /// Flips to `true` exactly once, when hydration completes.
    hydrated: watch::Sender<bool>,
}

impl<S: DurableStorage> SessionStore<S, JsonCodec> {
    /// Creates an empty, unhydrated store persisting through `storage`
    /// as JSON.
    pub fn new(storage: S, config: SessionConfig) -> Self {
        Self::with_codec(storage, JsonCodec, config)
    }
}

impl<S: DurableStorage, C: Codec> SessionStore<S, C> {
    /// Creates an empty, unhydrated store with a custom codec.
    pub fn with_codec(storage: S, codec: C, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::empty());
        let (hydrated, _) = watch::channel(false);
        Self {
            storage,
            codec,
            config,
            writer: Mutex::new(SessionSnapshot::empty()),
            state,
            hydrated,
        }
    }

    // =====================================================================
    // Reads
    // =====================================================================

    /// A copy of the current session.
    ///
    /// Before [`is_hydrated`](Self::is_hydrated) returns `true` this is
    /// provisional and should not be used to decide whether the user is
    /// logged in.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// The current user, if known.
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    /// The current token, if any.
    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    /// The cached authentication flag.
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    /// Returns `true` once persisted state has been restored.
    pub fn is_hydrated(&self) -> bool {
        *self.hydrated.borrow()
    }

    /// Subscribes to session changes. The receiver starts at the current
    /// value and is notified after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Subscribes to the hydration-complete signal.
    pub fn subscribe_hydrated(&self) -> watch::Receiver<bool> {
        self.hydrated.subscribe()
    }

    /// Resolves once hydration has completed (immediately if it already
    /// has).
    pub async fn wait_hydrated(&self) {
        let mut rx = self.hydrated.subscribe();
        // The sender lives in `self`, so the channel can't close while
        // we're borrowing it.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// The storage keys this store uses.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // =====================================================================
    // Mutations
    // =====================================================================

    /// Replaces the user. The authentication flag becomes "user present".
    ///
    /// Clearing the user while a token is held intentionally leaves the flag
    /// on: a held token always means authenticated. Use [`logout`] to end
    /// the session.
    ///
    /// [`logout`]: Self::logout
    ///
    /// # Errors
    /// Returns a storage or encode error if persisting fails; the change
    /// itself is already live.
    pub async fn set_user(
        &self,
        user: Option<User>,
    ) -> Result<(), SessionError> {
        let mut current = self.writer.lock().await;
        self.commit(&mut current, SessionAction::SetUser(user)).await
    }

    /// Replaces the token and writes (or clears) the token slot. The
    /// authentication flag becomes "token present".
    ///
    /// # Errors
    /// Returns a storage or encode error if persisting fails.
    pub async fn set_token(
        &self,
        token: Option<String>,
    ) -> Result<(), SessionError> {
        let mut current = self.writer.lock().await;
        self.commit(&mut current, SessionAction::SetToken(token)).await
    }

    /// Installs a fresh session after login or registration.
    ///
    /// # Errors
    /// Returns a storage or encode error if persisting fails.
    pub async fn login(
        &self,
        user: User,
        token: String,
    ) -> Result<(), SessionError> {
        let mut current = self.writer.lock().await;
        let user_id = user.id.clone();
        self.commit(&mut current, SessionAction::Login { user, token })
            .await?;
        tracing::info!(%user_id, "logged in");
        Ok(())
    }

    /// Clears the session and the token slot.
    ///
    /// # Errors
    /// Returns a storage or encode error if persisting fails.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let mut current = self.writer.lock().await;
        self.commit(&mut current, SessionAction::Logout).await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Placeholder for "refresh the current user".
    ///
    /// Does nothing. The store can't depend on a profile fetcher without
    /// the fetcher depending back on the store; refreshing is the job of
    /// the bootstrapper and the background refresher, which fetch and
    /// then call [`set_user_if_token`](Self::set_user_if_token).
    pub fn refresh_user(&self) {
        tracing::trace!("refresh_user is a no-op on the store");
    }

    /// Replaces the user only if the session still holds `expected_token`.
    ///
    /// This is how asynchronous profile fetches report back: if the user
    /// logged out (or logged in as someone else) while the request was in
    /// flight, the result is dropped instead of resurrecting stale data.
    ///
    /// Returns `true` if the user was applied.
    pub async fn set_user_if_token(
        &self,
        expected_token: &str,
        user: Option<User>,
    ) -> Result<bool, SessionError> {
        let mut current = self.writer.lock().await;
        if current.token.as_deref() != Some(expected_token) {
            tracing::debug!("dropping profile update for a replaced session");
            return Ok(false);
        }
        self.commit(&mut current, SessionAction::SetUser(user)).await?;
        Ok(true)
    }

    /// Logs out only if the session still holds `expected_token`.
    ///
    /// Returns `true` if the session was cleared.
    pub async fn logout_if_token(
        &self,
        expected_token: &str,
    ) -> Result<bool, SessionError> {
        let mut current = self.writer.lock().await;
        if current.token.as_deref() != Some(expected_token) {
            tracing::debug!("ignoring logout for a replaced session");
            return Ok(false);
        }
        self.commit(&mut current, SessionAction::Logout).await?;
        tracing::info!("logged out (credential rejected)");
        Ok(true)
    }

    // =====================================================================
    // Hydration and reconciliation
    // =====================================================================

    /// Restores the persisted session, then reconciles it with the token
    /// slot. Runs once per store.
    ///
    /// A snapshot that can't be decoded (corrupt, or written by a newer
    /// format version) is logged and ignored, leaving the current
    /// in-memory session in place.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyHydrated`] on a second call
    /// - [`SessionError::Storage`] if storage can't be read; the store
    ///   stays unhydrated and the call can be retried
    pub async fn hydrate(&self) -> Result<HydrationReport, SessionError> {
        let mut current = self.writer.lock().await;
        if self.is_hydrated() {
            return Err(SessionError::AlreadyHydrated);
        }

        let mut restored = false;
        let mut discarded = false;
        if let Some(bytes) = self.storage.get(&self.config.storage_key).await?
        {
            match self.decode_snapshot(&bytes) {
                Ok(snapshot) => {
                    *current = snapshot;
                    restored = true;
                }
                Err(e) => {
                    tracing::warn!(
                        key = %self.config.storage_key,
                        error = %e,
                        "discarding unreadable persisted session"
                    );
                    discarded = true;
                }
            }
        }
        self.state.send_replace(current.clone());

        let repairs = self.reconcile_locked(&mut current).await?;

        self.hydrated.send_replace(true);
        tracing::info!(
            restored,
            authenticated = current.is_authenticated,
            has_user = current.user.is_some(),
            repairs = repairs.len(),
            "session hydrated"
        );

        Ok(HydrationReport {
            restored,
            discarded,
            repairs,
        })
    }

    /// Runs the reconciliation pass again on demand.
    ///
    /// Hydration already runs it once; on a consistent store a second run
    /// finds nothing and writes nothing.
    ///
    /// # Errors
    /// Returns [`SessionError::NotHydrated`] before hydration.
    pub async fn reconcile(&self) -> Result<Vec<Repair>, SessionError> {
        let mut current = self.writer.lock().await;
        if !self.is_hydrated() {
            return Err(SessionError::NotHydrated);
        }
        self.reconcile_locked(&mut current).await
    }

    // =====================================================================
    // Internals
    // =====================================================================

    /// Applies an action: publish first, then persist snapshot, then slot.
    ///
    /// The snapshot is always written before the slot, so after a crash
    /// between the two writes the snapshot is the newer copy. The
    /// reconciliation rules depend on that ordering.
    async fn commit(
        &self,
        current: &mut SessionSnapshot,
        action: SessionAction,
    ) -> Result<(), SessionError> {
        if !self.is_hydrated() {
            tracing::debug!(
                action = action.name(),
                "mutation before hydration completed"
            );
        }
        let name = action.name();
        let transition = apply(current, action);
        *current = transition.next;
        self.state.send_replace(current.clone());
        tracing::debug!(
            action = name,
            authenticated = current.is_authenticated,
            "session updated"
        );

        self.persist(current).await?;
        match transition.slot {
            TokenSlotOp::Keep => {}
            TokenSlotOp::Write(token) => {
                self.storage
                    .set(&self.config.token_key, token.as_bytes())
                    .await?;
            }
            TokenSlotOp::Remove => {
                self.storage.remove(&self.config.token_key).await?;
            }
        }
        Ok(())
    }

    async fn reconcile_locked(
        &self,
        current: &mut SessionSnapshot,
    ) -> Result<Vec<Repair>, SessionError> {
        let slot = self.read_slot_token().await?;
        let outcome = reconcile(current, slot.as_deref());
        if outcome.is_clean() {
            return Ok(Vec::new());
        }

        let changed = outcome.snapshot_changed();
        *current = outcome.snapshot;
        if changed {
            self.state.send_replace(current.clone());
            self.persist(current).await?;
        }
        if let Some(token) = &outcome.slot_write {
            self.storage
                .set(&self.config.token_key, token.as_bytes())
                .await?;
        }

        tracing::info!(repairs = ?outcome.repairs, "session reconciled");
        Ok(outcome.repairs)
    }

    async fn persist(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<(), SessionError> {
        let bytes = self
            .codec
            .encode(&PersistedSession::new(snapshot.clone()))?;
        self.storage.set(&self.config.storage_key, &bytes).await?;
        Ok(())
    }

    fn decode_snapshot(
        &self,
        bytes: &[u8],
    ) -> Result<SessionSnapshot, SessionError> {
        let persisted: PersistedSession = self.codec.decode(bytes)?;
        Ok(persisted.into_snapshot()?)
    }

    /// Reads the raw token slot. Empty or non-UTF-8 contents count as no
    /// token.
    async fn read_slot_token(&self) -> Result<Option<String>, SessionError> {
        let Some(bytes) = self.storage.get(&self.config.token_key).await?
        else {
            return Ok(None);
        };
        match String::from_utf8(bytes) {
            Ok(token) if !token.is_empty() => Ok(Some(token)),
            Ok(_) => Ok(None),
            Err(_) => {
                tracing::warn!(
                    key = %self.config.token_key,
                    "ignoring non-UTF-8 token slot"
                );
                Ok(None)
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
