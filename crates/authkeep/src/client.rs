//! `AuthClient` builder and lifecycle.
//!
//! This is the entry point for embedding authkeep. It ties together all
//! the layers: storage → session store → bootstrapper → refresher.

use std::sync::{Arc, Mutex};

use authkeep_bootstrap::{BootstrapPhase, Bootstrapper, VerificationOutcome, VerifyConfig};
use authkeep_protocol::{Codec, JsonCodec};
use authkeep_refresh::{ProfileRefresher, RefreshConfig, RefreshStats, Visibility};
use authkeep_session::{ProfileFetcher, SessionStore};
use authkeep_storage::{DurableStorage, FileStorage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{AuthkeepError, ClientConfig, HttpProfileClient};

/// Visibility events buffered before the refresher catches up.
const VISIBILITY_BUFFER: usize = 8;

/// Builder for configuring an [`AuthClient`].
///
/// # Example
///
/// ```rust,ignore
/// use authkeep::prelude::*;
///
/// let client = AuthClient::builder(ClientConfig::from_env()?)
///     .verify_config(VerifyConfig::tolerant(2))
///     .build()
///     .await?;
/// client.start().await?;
/// ```
pub struct AuthClientBuilder {
    config: ClientConfig,
    verify: VerifyConfig,
    refresh: Option<RefreshConfig>,
}

impl AuthClientBuilder {
    /// Creates a builder. Periodic refresh is on, at the config's interval.
    pub fn new(config: ClientConfig) -> Self {
        let refresh = Some(config.refresh_config());
        Self {
            config,
            verify: VerifyConfig::default(),
            refresh,
        }
    }

    /// Sets how start-up verification treats fetch failures.
    pub fn verify_config(mut self, verify: VerifyConfig) -> Self {
        self.verify = verify;
        self
    }

    /// Replaces the refresh settings.
    pub fn refresh_config(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Disables the background refresher.
    pub fn without_refresh(mut self) -> Self {
        self.refresh = None;
        self
    }

    /// Builds a client backed by files under the config's storage
    /// directory and the HTTP profile endpoint.
    ///
    /// # Errors
    /// Fails if the storage directory can't be created or the HTTP client
    /// can't be built.
    pub async fn build(
        self,
    ) -> Result<AuthClient<FileStorage, HttpProfileClient>, AuthkeepError> {
        let storage = FileStorage::open(self.config.storage_dir.clone()).await?;
        let fetcher = HttpProfileClient::new(&self.config)?;
        Ok(self.build_with(storage, fetcher))
    }

    /// Builds a client over any storage backend and fetcher.
    pub fn build_with<S, F>(self, storage: S, fetcher: F) -> AuthClient<S, F>
    where
        S: DurableStorage,
        F: ProfileFetcher,
    {
        self.build_with_codec(storage, JsonCodec, fetcher)
    }

    /// Same as [`build_with`](Self::build_with) with a custom snapshot
    /// codec.
    pub fn build_with_codec<S, F, C>(self, storage: S, codec: C, fetcher: F) -> AuthClient<S, F, C>
    where
        S: DurableStorage,
        F: ProfileFetcher,
        C: Codec,
    {
        let store = Arc::new(SessionStore::with_codec(
            storage,
            codec,
            self.config.session.clone(),
        ));
        let fetcher = Arc::new(fetcher);
        let bootstrapper = Bootstrapper::new(Arc::clone(&store), Arc::clone(&fetcher), self.verify);

        AuthClient {
            store,
            fetcher,
            bootstrapper,
            refresh: self.refresh,
            refresher: Mutex::new(None),
        }
    }
}

/// The running refresher task and its control channels.
struct RefreshHandle {
    visibility: mpsc::Sender<Visibility>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<RefreshStats>,
}

/// A client session: store, verification, and background refresh.
///
/// Call [`start()`](Self::start) once at application start. Consumers read
/// and mutate the session through [`store()`](Self::store).
pub struct AuthClient<S, F, C = JsonCodec>
where
    S: DurableStorage,
    F: ProfileFetcher,
    C: Codec,
{
    store: Arc<SessionStore<S, C>>,
    fetcher: Arc<F>,
    bootstrapper: Bootstrapper<S, Arc<F>, C>,
    refresh: Option<RefreshConfig>,
    refresher: Mutex<Option<RefreshHandle>>,
}

impl AuthClient<FileStorage, HttpProfileClient> {
    /// Creates a new builder.
    pub fn builder(config: ClientConfig) -> AuthClientBuilder {
        AuthClientBuilder::new(config)
    }
}

impl<S, F, C> AuthClient<S, F, C>
where
    S: DurableStorage,
    F: ProfileFetcher,
    C: Codec,
{
    /// The shared session store.
    pub fn store(&self) -> &Arc<SessionStore<S, C>> {
        &self.store
    }

    /// Where start-up verification is.
    pub fn phase(&self) -> BootstrapPhase {
        self.bootstrapper.phase()
    }

    /// Restores and verifies the session, then starts the refresher.
    ///
    /// Safe to call more than once: later calls report
    /// [`VerificationOutcome::AlreadyRan`] and leave the running
    /// refresher alone.
    ///
    /// # Errors
    /// Returns the store's error if the persisted session can't be read.
    /// Nothing is started in that case and the call can be retried.
    pub async fn start(&self) -> Result<VerificationOutcome, AuthkeepError> {
        let outcome = self.bootstrapper.run().await?;
        self.spawn_refresher();
        Ok(outcome)
    }

    /// Reports an application visibility change to the refresher.
    ///
    /// Does nothing when no refresher is running.
    pub async fn set_visibility(&self, visibility: Visibility) {
        let sender = self
            .lock_refresher()
            .as_ref()
            .map(|handle| handle.visibility.clone());
        if let Some(sender) = sender {
            if sender.send(visibility).await.is_err() {
                tracing::debug!("refresher gone, visibility change dropped");
            }
        }
    }

    /// Returns `true` while the background refresher is running.
    pub fn is_refreshing(&self) -> bool {
        self.lock_refresher()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Stops the refresher and returns its counters, or `None` if it was
    /// never started.
    pub async fn shutdown(&self) -> Option<RefreshStats> {
        let handle = self.lock_refresher().take()?;
        let _ = handle.shutdown.send(true);
        match handle.task.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "refresher task failed");
                None
            }
        }
    }

    fn spawn_refresher(&self) {
        let Some(config) = self.refresh.clone() else {
            return;
        };
        let mut slot = self.lock_refresher();
        if slot.is_some() {
            return;
        }

        let (visibility, events) = mpsc::channel(VISIBILITY_BUFFER);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let refresher = ProfileRefresher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            config,
        );
        let task = tokio::spawn(refresher.run(events, shutdown_rx));
        tracing::debug!("refresher spawned");

        *slot = Some(RefreshHandle {
            visibility,
            shutdown,
            task,
        });
    }

    fn lock_refresher(&self) -> std::sync::MutexGuard<'_, Option<RefreshHandle>> {
        self.refresher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
