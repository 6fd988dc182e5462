//! Periodic profile refresh for authkeep.
//!
//! Keeps the cached profile fresh while a session is active: re-fetches the
//! current user on a fixed interval and refreshes immediately when the
//! application becomes visible again. With
//! [`RefreshConfig::pause_when_hidden`] the interval is also suspended
//! while the application is hidden.
//!
//! # Integration
//!
//! The refresher owns its loop. Spawn it next to the bootstrapper and feed
//! it visibility changes:
//!
//! ```ignore
//! let (visibility_tx, visibility_rx) = mpsc::channel(8);
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let refresher = ProfileRefresher::new(store, fetcher, RefreshConfig::default());
//! tokio::spawn(refresher.run(visibility_rx, shutdown_rx));
//!
//! visibility_tx.send(Visibility::Hidden).await?;
//! // ...
//! shutdown_tx.send(true)?;
//! ```
//!
//! Every profile that comes back is applied with
//! [`SessionStore::set_user_if_token`], so a response that lands after a
//! logout or re-login is dropped instead of resurrecting the old user.

use std::sync::Arc;
use std::time::Duration;

use authkeep_protocol::{Codec, JsonCodec};
use authkeep_session::{FetchError, ProfileFetcher, SessionStore};
use authkeep_storage::DurableStorage;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the profile refresher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Time between interval refreshes. Default: 5 minutes.
    pub interval: Duration,
    /// Random delay (0–max) added to the *first* refresh so many clients
    /// started together don't hit the backend in lockstep.
    pub initial_jitter: Duration,
    /// Refresh immediately when visibility is regained.
    pub refresh_on_visible: bool,
    /// Suspend interval refreshes while the application is hidden.
    /// Default: off, the interval keeps running in the background.
    pub pause_when_hidden: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            initial_jitter: Duration::from_secs(2),
            refresh_on_visible: true,
            pause_when_hidden: false,
        }
    }
}

impl RefreshConfig {
    /// Shortest interval the refresher accepts.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

    /// Longest interval (and initial jitter) the refresher accepts: one day.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Config with the given interval and default settings otherwise.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values.
    ///
    /// Called by [`ProfileRefresher::new`]. Rules:
    /// - `interval` clamped to [`Self::MIN_INTERVAL`]..=[`Self::MAX_INTERVAL`].
    /// - `initial_jitter` capped to [`Self::MAX_INTERVAL`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "refresh interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.interval > Self::MAX_INTERVAL {
            warn!(
                interval_s = self.interval.as_secs(),
                max_s = Self::MAX_INTERVAL.as_secs(),
                "refresh interval exceeds maximum, clamping"
            );
            self.interval = Self::MAX_INTERVAL;
        }
        if self.initial_jitter > Self::MAX_INTERVAL {
            self.initial_jitter = Self::MAX_INTERVAL;
        }
        self
    }

    fn first_delay(&self) -> Duration {
        let max_us = u64::try_from(self.initial_jitter.as_micros()).unwrap_or(u64::MAX);
        let jitter = if max_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..max_us))
        } else {
            Duration::ZERO
        };
        self.interval.saturating_add(jitter)
    }
}

// ---------------------------------------------------------------------------
// Events and outcomes
// ---------------------------------------------------------------------------

/// Application visibility, as reported by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Why a refresh ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Interval,
    BecameVisible,
    Manual,
}

/// How a single refresh ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No token in the store; nothing was fetched.
    NoSession,
    /// The fresh profile was stored.
    Updated,
    /// The session changed while the request was in flight; the response
    /// was dropped.
    Stale,
    /// The backend rejected the token and the session was cleared.
    LoggedOut,
    /// The fetch failed for another reason; the session is untouched.
    Failed(FetchError),
}

/// Counters for the refresher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Refreshes that made a request.
    pub attempts: u64,
    pub updated: u64,
    pub stale: u64,
    pub logged_out: u64,
    pub failed: u64,
    /// Refreshes skipped for lack of a session.
    pub skipped: u64,
}

impl RefreshStats {
    fn record(&mut self, outcome: &RefreshOutcome) {
        match outcome {
            RefreshOutcome::NoSession => {
                self.skipped += 1;
                return;
            }
            RefreshOutcome::Updated => self.updated += 1,
            RefreshOutcome::Stale => self.stale += 1,
            RefreshOutcome::LoggedOut => self.logged_out += 1,
            RefreshOutcome::Failed(_) => self.failed += 1,
        }
        self.attempts += 1;
    }
}

// ---------------------------------------------------------------------------
// Refresher
// ---------------------------------------------------------------------------

/// Re-fetches the current user's profile while a session is active.
pub struct ProfileRefresher<S, F, C = JsonCodec>
where
    S: DurableStorage,
    F: ProfileFetcher,
    C: Codec,
{
    store: Arc<SessionStore<S, C>>,
    fetcher: F,
    config: RefreshConfig,
    paused: bool,
    hidden: bool,
    stats: RefreshStats,
}

impl<S, F, C> ProfileRefresher<S, F, C>
where
    S: DurableStorage,
    F: ProfileFetcher,
    C: Codec,
{
    /// Creates a refresher for `store`. The config is validated first.
    pub fn new(
        store: Arc<SessionStore<S, C>>,
        fetcher: F,
        config: RefreshConfig,
    ) -> Self {
        let config = config.validated();
        debug!(
            interval_s = config.interval.as_secs(),
            refresh_on_visible = config.refresh_on_visible,
            "profile refresher created"
        );
        Self {
            store,
            fetcher,
            config,
            paused: false,
            hidden: false,
            stats: RefreshStats::default(),
        }
    }

    /// The validated config.
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Whether interval refreshes are paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Counters so far.
    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Pauses interval refreshes. Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!("profile refresh paused");
        }
    }

    /// Resumes interval refreshes. Returns `true` if it was paused.
    pub fn resume(&mut self) -> bool {
        if self.paused {
            self.paused = false;
            debug!("profile refresh resumed");
            true
        } else {
            false
        }
    }

    /// Runs one refresh now.
    ///
    /// Skips when the store holds no token. A rejected credential logs
    /// the session out; any other failure is logged and leaves the
    /// session alone.
    pub async fn refresh_once(&mut self, trigger: RefreshTrigger) -> RefreshOutcome {
        let outcome = self.refresh(trigger).await;
        self.stats.record(&outcome);
        outcome
    }

    async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        let Some(token) = self.store.token() else {
            trace!(?trigger, "no session, skipping refresh");
            return RefreshOutcome::NoSession;
        };

        match self.fetcher.fetch_current_user(&token).await {
            Ok(user) => match self.store.set_user_if_token(&token, Some(user)).await {
                Ok(true) => {
                    debug!(?trigger, "profile refreshed");
                    RefreshOutcome::Updated
                }
                Ok(false) => RefreshOutcome::Stale,
                Err(e) => {
                    warn!(error = %e, "could not persist refreshed profile");
                    RefreshOutcome::Updated
                }
            },
            Err(e) if e.is_credential_rejection() => {
                warn!(?trigger, error = %e, "token rejected during refresh");
                match self.store.logout_if_token(&token).await {
                    Ok(true) => RefreshOutcome::LoggedOut,
                    Ok(false) => RefreshOutcome::Stale,
                    Err(persist) => {
                        warn!(error = %persist, "could not persist logout");
                        RefreshOutcome::LoggedOut
                    }
                }
            }
            Err(e) => {
                warn!(?trigger, error = %e, "profile refresh failed");
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Runs the refresh loop until `shutdown` flips to `true` or its
    /// sender is dropped. Returns the final counters.
    ///
    /// Waits for the store to hydrate before the first refresh. If the
    /// visibility channel closes, the loop keeps refreshing on the
    /// interval.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Visibility>,
        mut shutdown: watch::Receiver<bool>,
    ) -> RefreshStats {
        tokio::select! {
            () = self.store.wait_hydrated() => {}
            () = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                return self.stats;
            }
        }
        info!("profile refresher started");

        let mut next_due = deadline_after(self.config.first_delay());
        let mut events_open = true;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv(), if events_open => match event {
                    Some(Visibility::Hidden) => {
                        self.hidden = true;
                        if self.config.pause_when_hidden {
                            self.pause();
                        }
                    }
                    Some(Visibility::Visible) => {
                        if std::mem::take(&mut self.hidden) {
                            self.resume();
                            next_due = deadline_after(self.config.interval);
                            if self.config.refresh_on_visible {
                                self.refresh_once(RefreshTrigger::BecameVisible).await;
                            }
                        }
                    }
                    None => {
                        debug!("visibility channel closed");
                        events_open = false;
                    }
                },
                () = time::sleep_until(next_due), if !self.paused => {
                    self.refresh_once(RefreshTrigger::Interval).await;
                    next_due = deadline_after(self.config.interval);
                }
            }
        }

        info!(
            attempts = self.stats.attempts,
            updated = self.stats.updated,
            failed = self.stats.failed,
            "profile refresher stopped"
        );
        self.stats
    }
}

/// `now + delay`, saturating at tokio's far-future instant.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + RefreshConfig::MAX_INTERVAL)
}
