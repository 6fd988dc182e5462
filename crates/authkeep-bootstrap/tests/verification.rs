//! Integration tests for the bootstrapper's once-per-load verification.
//!
//! Timing-sensitive tests run with `start_paused = true`, so the mock
//! fetcher's artificial latency and the retry backoff cost no real time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use authkeep_bootstrap::{
    BootstrapPhase, Bootstrapper, VerificationOutcome, VerifyConfig,
};
use authkeep_protocol::{SessionSnapshot, User};
use authkeep_session::{FetchError, ProfileFetcher, SessionConfig, SessionStore};
use authkeep_storage::{DurableStorage, MemoryStorage};

// =========================================================================
// Mock fetcher
// =========================================================================

/// Replays scripted responses and counts calls.
///
/// When the script runs out it answers with `fallback`.
struct ScriptedFetcher {
    calls: AtomicUsize,
    latency: Duration,
    script: Mutex<VecDeque<Result<User, FetchError>>>,
    fallback: Result<User, FetchError>,
}

impl ScriptedFetcher {
    fn always(result: Result<User, FetchError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fallback: result,
        }
    }

    fn then(self, result: Result<User, FetchError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProfileFetcher for ScriptedFetcher {
    async fn fetch_current_user(&self, _token: &str) -> Result<User, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn ada() -> User {
    User::new("1", "ada")
}

fn rejected() -> FetchError {
    FetchError::Unauthorized("token expired".into())
}

fn offline() -> FetchError {
    FetchError::Transport("connection refused".into())
}

/// Storage pre-seeded as if a previous load left `token` (and maybe a
/// user) behind.
async fn storage_with(token: &str, user: Option<User>) -> MemoryStorage {
    let storage = MemoryStorage::new();
    let persisted = authkeep_protocol::PersistedSession::new(SessionSnapshot {
        user,
        token: Some(token.to_string()),
        is_authenticated: true,
    });
    let bytes = encode_persisted(&persisted);
    storage.set("auth-storage", &bytes).await.unwrap();
    storage.set("token", token.as_bytes()).await.unwrap();
    storage
}

fn encode_persisted(persisted: &authkeep_protocol::PersistedSession) -> Vec<u8> {
    use authkeep_protocol::Codec;
    authkeep_protocol::JsonCodec.encode(persisted).unwrap()
}

fn bootstrapper(
    storage: MemoryStorage,
    fetcher: Arc<ScriptedFetcher>,
    config: VerifyConfig,
) -> Bootstrapper<MemoryStorage, Arc<ScriptedFetcher>> {
    let store = Arc::new(SessionStore::new(storage, SessionConfig::default()));
    Bootstrapper::new(store, fetcher, config)
}

// =========================================================================
// Decision table
// =========================================================================

#[tokio::test]
async fn test_run_token_without_user_loads_profile() {
    let fetcher = Arc::new(ScriptedFetcher::always(Ok(ada())));
    let boot = bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    );

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::ProfileLoaded);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(boot.store().user(), Some(ada()));
    assert!(boot.store().is_authenticated());
    assert_eq!(boot.phase(), BootstrapPhase::Verified);
    assert_eq!(boot.outcome(), Some(VerificationOutcome::ProfileLoaded));
}

#[tokio::test]
async fn test_run_cached_profile_makes_no_request() {
    let fetcher = Arc::new(ScriptedFetcher::always(Err(rejected())));
    let boot = bootstrapper(
        storage_with("t1", Some(ada())).await,
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    );

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::TrustedCached);
    assert_eq!(fetcher.calls(), 0, "fetcher must never be invoked");
    assert_eq!(boot.store().token().as_deref(), Some("t1"));
}

#[tokio::test]
async fn test_run_without_token_is_anonymous() {
    let fetcher = Arc::new(ScriptedFetcher::always(Ok(ada())));
    let boot = bootstrapper(
        MemoryStorage::new(),
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    );

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::Anonymous);
    assert_eq!(fetcher.calls(), 0);
    assert!(boot.store().snapshot().is_empty());
}

#[tokio::test]
async fn test_run_slot_only_token_is_adopted_then_verified() {
    // Only the raw slot survived; reconciliation adopts it and the
    // missing user triggers a fetch.
    let storage = MemoryStorage::new();
    storage.set("token", b"abc").await.unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Ok(ada())));
    let boot = bootstrapper(storage, Arc::clone(&fetcher), VerifyConfig::default());

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::ProfileLoaded);
    assert_eq!(boot.store().token().as_deref(), Some("abc"));
    assert_eq!(boot.store().user(), Some(ada()));
}

// =========================================================================
// Failure semantics
// =========================================================================

#[tokio::test]
async fn test_run_rejected_token_logs_out() {
    let storage = storage_with("expired", None).await;
    let fetcher = Arc::new(ScriptedFetcher::always(Err(rejected())));
    let boot = bootstrapper(storage.clone(), Arc::clone(&fetcher), VerifyConfig::default());

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::LoggedOut { reason: rejected() });
    assert_eq!(boot.store().snapshot(), SessionSnapshot::empty());
    assert_eq!(storage.peek("token"), None);
}

#[tokio::test]
async fn test_run_transport_failure_logs_out_by_default() {
    let storage = storage_with("t1", None).await;
    let fetcher = Arc::new(ScriptedFetcher::always(Err(offline())));
    let boot = bootstrapper(storage, Arc::clone(&fetcher), VerifyConfig::default());

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::LoggedOut { reason: offline() });
    assert_eq!(fetcher.calls(), 1, "no retry by default");
    assert!(boot.store().snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_tolerant_config_retries_then_loads() {
    let fetcher = Arc::new(
        ScriptedFetcher::always(Ok(ada()))
            .then(Err(offline()))
            .then(Err(offline())),
    );
    let boot = bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::tolerant(2),
    );

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::ProfileLoaded);
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_tolerant_config_keeps_session_when_unreachable() {
    let fetcher = Arc::new(ScriptedFetcher::always(Err(offline())));
    let boot = bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::tolerant(1),
    );

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::KeptUnverified { reason: offline() });
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(boot.store().token().as_deref(), Some("t1"));
    assert!(boot.store().is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_run_tolerant_config_still_logs_out_on_rejection() {
    let fetcher = Arc::new(ScriptedFetcher::always(Err(rejected())));
    let boot = bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::tolerant(3),
    );

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::LoggedOut { reason: rejected() });
    assert_eq!(fetcher.calls(), 1, "rejections are never retried");
}

// =========================================================================
// Exactly-once
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_two_rapid_hydration_signals_fetch_once() {
    let fetcher = Arc::new(
        ScriptedFetcher::always(Ok(ada())).with_latency(Duration::from_millis(200)),
    );
    let boot = bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    );
    boot.store().hydrate().await.unwrap();

    let (first, second) = tokio::join!(boot.on_hydrated(), boot.on_hydrated());

    assert_eq!(fetcher.calls(), 1);
    let outcomes = [first, second];
    assert!(outcomes.contains(&VerificationOutcome::ProfileLoaded));
    assert!(outcomes.contains(&VerificationOutcome::AlreadyRan));
}

#[tokio::test]
async fn test_signal_after_verification_is_ignored() {
    let fetcher = Arc::new(ScriptedFetcher::always(Ok(ada())));
    let boot = bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    );
    boot.run().await.unwrap();

    // Later store churn plus another signal must not verify again.
    boot.store().set_user(None).await.unwrap();
    let again = boot.on_hydrated().await;

    assert_eq!(again, VerificationOutcome::AlreadyRan);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(boot.outcome(), Some(VerificationOutcome::ProfileLoaded));
}

#[tokio::test]
async fn test_run_after_external_hydration_still_verifies() {
    let fetcher = Arc::new(ScriptedFetcher::always(Ok(ada())));
    let boot = bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    );
    boot.store().hydrate().await.unwrap();

    let outcome = boot.run().await.unwrap();

    assert_eq!(outcome, VerificationOutcome::ProfileLoaded);
}

#[tokio::test(start_paused = true)]
async fn test_signal_before_hydration_waits_for_it() {
    let fetcher = Arc::new(ScriptedFetcher::always(Ok(ada())));
    let boot = Arc::new(bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    ));

    let early = {
        let boot = Arc::clone(&boot);
        tokio::spawn(async move { boot.on_hydrated().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(boot.phase(), BootstrapPhase::Unhydrated);
    assert_eq!(fetcher.calls(), 0);

    boot.store().hydrate().await.unwrap();
    let outcome = early.await.unwrap();

    assert_eq!(outcome, VerificationOutcome::ProfileLoaded);
    assert_eq!(fetcher.calls(), 1);
}

// =========================================================================
// Late completions
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_profile_arriving_after_logout_is_dropped() {
    let fetcher = Arc::new(
        ScriptedFetcher::always(Ok(ada())).with_latency(Duration::from_millis(100)),
    );
    let boot = Arc::new(bootstrapper(
        storage_with("t1", None).await,
        Arc::clone(&fetcher),
        VerifyConfig::default(),
    ));
    boot.store().hydrate().await.unwrap();

    let verifying = {
        let boot = Arc::clone(&boot);
        tokio::spawn(async move { boot.on_hydrated().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(boot.phase(), BootstrapPhase::HydratedUnverified);

    // The user logs out while the fetch is in flight.
    boot.store().logout().await.unwrap();
    let outcome = verifying.await.unwrap();

    assert_eq!(outcome, VerificationOutcome::Superseded);
    assert!(boot.store().snapshot().is_empty(), "no stale profile resurrected");
}
