//! The bootstrapper: restores the session once per load and decides
//! whether the restored credential needs checking against the backend.

use std::sync::{Arc, Mutex, MutexGuard};

use authkeep_protocol::{Codec, JsonCodec, SessionSnapshot};
use authkeep_session::{
    FetchError, HydrationReport, ProfileFetcher, SessionError, SessionStore,
};
use authkeep_storage::DurableStorage;

use crate::{BootstrapPhase, VerifyConfig};

// ---------------------------------------------------------------------------
// Plan and outcome
// ---------------------------------------------------------------------------

/// What verification should do, decided from the restored session alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationPlan {
    /// Token but no profile: ask the backend who this is.
    FetchProfile(String),
    /// Token and profile both restored: trust them for this load.
    TrustCached,
    /// No token: nothing to verify.
    Anonymous,
}

impl VerificationPlan {
    /// The once-per-load decision table.
    pub fn for_snapshot(snapshot: &SessionSnapshot) -> Self {
        match (&snapshot.token, &snapshot.user) {
            (Some(token), None) => Self::FetchProfile(token.clone()),
            (Some(_), Some(_)) => Self::TrustCached,
            (None, _) => Self::Anonymous,
        }
    }
}

/// How a verification attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// No token was restored.
    Anonymous,
    /// Token and user were restored; no request was made.
    TrustedCached,
    /// The profile was fetched and stored.
    ProfileLoaded,
    /// The profile arrived, but the session had changed (logout, new
    /// login) while the request was in flight, so it was dropped.
    Superseded,
    /// The fetch failed and the session was cleared.
    LoggedOut { reason: FetchError },
    /// The backend was unreachable and the policy kept the session.
    KeptUnverified { reason: FetchError },
    /// Verification had already been claimed by an earlier signal.
    AlreadyRan,
}

// ---------------------------------------------------------------------------
// Bootstrapper
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Progress {
    phase: BootstrapPhase,
    outcome: Option<VerificationOutcome>,
}

/// Runs restoration and verification exactly once per load.
///
/// The latch is the phase itself: the first hydration-complete signal
/// moves `Unhydrated → HydratedUnverified` synchronously, before anything
/// is awaited, and every later signal sees a phase past `Unhydrated` and
/// returns [`VerificationOutcome::AlreadyRan`]. Incidental store updates
/// can't re-trigger verification because nothing here watches them.
pub struct Bootstrapper<S, F, C = JsonCodec>
where
    S: DurableStorage,
    F: ProfileFetcher,
    C: Codec,
{
    store: Arc<SessionStore<S, C>>,
    fetcher: F,
    config: VerifyConfig,
    progress: Mutex<Progress>,
}

impl<S, F, C> Bootstrapper<S, F, C>
where
    S: DurableStorage,
    F: ProfileFetcher,
    C: Codec,
{
    /// Creates a bootstrapper for `store`, verifying through `fetcher`.
    pub fn new(
        store: Arc<SessionStore<S, C>>,
        fetcher: F,
        config: VerifyConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
            progress: Mutex::new(Progress {
                phase: BootstrapPhase::Unhydrated,
                outcome: None,
            }),
        }
    }

    /// The current phase.
    pub fn phase(&self) -> BootstrapPhase {
        self.lock().phase
    }

    /// How verification ended, once it has.
    pub fn outcome(&self) -> Option<VerificationOutcome> {
        self.lock().outcome.clone()
    }

    /// The store this bootstrapper verifies.
    pub fn store(&self) -> &Arc<SessionStore<S, C>> {
        &self.store
    }

    /// Hydrates the store, then verifies.
    ///
    /// If something else already hydrated the store, that's fine: we go
    /// straight to verification.
    ///
    /// # Errors
    /// Returns the store's error if restoring from storage fails. In that
    /// case nothing was verified and the call can be retried.
    pub async fn run(&self) -> Result<VerificationOutcome, SessionError> {
        match self.store.hydrate().await {
            Ok(HydrationReport { repairs, .. }) if !repairs.is_empty() => {
                tracing::debug!(?repairs, "hydration repaired the session");
            }
            Ok(_) | Err(SessionError::AlreadyHydrated) => {}
            Err(e) => return Err(e),
        }
        Ok(self.on_hydrated().await)
    }

    /// Handles one hydration-complete signal.
    ///
    /// Waits for the store to report hydration, then claims verification.
    /// Only the first caller verifies; everyone else gets
    /// [`VerificationOutcome::AlreadyRan`] immediately.
    ///
    /// Never fails: fetch errors become a logout (or, with a tolerant
    /// config, an unverified-but-kept session) and a `warn` log.
    pub async fn on_hydrated(&self) -> VerificationOutcome {
        self.store.wait_hydrated().await;

        if !self.claim() {
            tracing::trace!("verification already claimed");
            return VerificationOutcome::AlreadyRan;
        }

        let plan = VerificationPlan::for_snapshot(&self.store.snapshot());
        tracing::debug!(?plan, "verification plan");

        let outcome = match plan {
            VerificationPlan::Anonymous => VerificationOutcome::Anonymous,
            VerificationPlan::TrustCached => VerificationOutcome::TrustedCached,
            VerificationPlan::FetchProfile(token) => self.verify(&token).await,
        };

        {
            let mut progress = self.lock();
            progress.phase = BootstrapPhase::Verified;
            progress.outcome = Some(outcome.clone());
        }
        tracing::info!(?outcome, "session verified");
        outcome
    }

    /// Moves `Unhydrated → HydratedUnverified`. Returns `false` if some
    /// other caller got there first.
    fn claim(&self) -> bool {
        let mut progress = self.lock();
        let target = BootstrapPhase::HydratedUnverified;
        if !progress.phase.can_transition_to(target) {
            return false;
        }
        progress.phase = target;
        true
    }

    async fn verify(&self, token: &str) -> VerificationOutcome {
        let mut attempt = 0u32;
        let error = loop {
            match self.fetcher.fetch_current_user(token).await {
                Ok(user) => return self.apply_profile(token, user).await,
                Err(e)
                    if e.is_transient()
                        && attempt < self.config.transport_retries =>
                {
                    attempt += 1;
                    tracing::debug!(
                        attempt,
                        error = %e,
                        "profile fetch failed, retrying"
                    );
                    tokio::time::sleep(self.config.backoff(attempt)).await;
                }
                Err(e) => break e,
            }
        };

        if error.is_transient() && self.config.keep_session_on_transport_error
        {
            tracing::warn!(
                error = %error,
                "backend unreachable, keeping unverified session"
            );
            return VerificationOutcome::KeptUnverified { reason: error };
        }

        tracing::warn!(error = %error, "verification failed, logging out");
        if let Err(e) = self.store.logout_if_token(token).await {
            // The in-memory session is already cleared; only the write
            // failed.
            tracing::warn!(error = %e, "could not persist logout");
        }
        VerificationOutcome::LoggedOut { reason: error }
    }

    async fn apply_profile(
        &self,
        token: &str,
        user: authkeep_protocol::User,
    ) -> VerificationOutcome {
        match self.store.set_user_if_token(token, Some(user)).await {
            Ok(true) => VerificationOutcome::ProfileLoaded,
            Ok(false) => VerificationOutcome::Superseded,
            Err(e) => {
                tracing::warn!(error = %e, "could not persist fetched profile");
                VerificationOutcome::ProfileLoaded
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authkeep_protocol::User;

    fn snap(user: bool, token: Option<&str>) -> SessionSnapshot {
        SessionSnapshot {
            user: user.then(|| User::new("1", "ada")),
            token: token.map(str::to_string),
            is_authenticated: token.is_some(),
        }
    }

    #[test]
    fn test_plan_token_without_user_fetches() {
        assert_eq!(
            VerificationPlan::for_snapshot(&snap(false, Some("t1"))),
            VerificationPlan::FetchProfile("t1".into())
        );
    }

    #[test]
    fn test_plan_token_with_user_trusts_cache() {
        assert_eq!(
            VerificationPlan::for_snapshot(&snap(true, Some("t1"))),
            VerificationPlan::TrustCached
        );
    }

    #[test]
    fn test_plan_no_token_is_anonymous() {
        assert_eq!(
            VerificationPlan::for_snapshot(&snap(false, None)),
            VerificationPlan::Anonymous
        );
        // A leftover user without a token is still anonymous.
        assert_eq!(
            VerificationPlan::for_snapshot(&snap(true, None)),
            VerificationPlan::Anonymous
        );
    }
}
