//! Bootstrap configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// VerifyConfig
// ---------------------------------------------------------------------------

/// How verification reacts to a failed profile fetch.
///
/// The defaults treat every failure as "credential no longer valid" and
/// log the user out, with no retry. That is harsh on a flaky network (a
/// single dropped request signs the user out), so embedders can opt into
/// retrying transport failures and/or keeping the session when the
/// backend was simply unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Extra attempts after a transport failure. 0 = no retry.
    pub transport_retries: u32,

    /// Delay before retry `n` is `retry_backoff * n`, saturating.
    pub retry_backoff: Duration,

    /// When `true`, a fetch that still fails with a transport error after
    /// all retries leaves the session in place (unverified) instead of
    /// logging out. Credential rejections always log out.
    pub keep_session_on_transport_error: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            transport_retries: 0,
            retry_backoff: Duration::from_millis(500),
            keep_session_on_transport_error: false,
        }
    }
}

impl VerifyConfig {
    /// Retries transport failures and keeps the session if the backend
    /// stays unreachable.
    pub fn tolerant(retries: u32) -> Self {
        Self {
            transport_retries: retries,
            keep_session_on_transport_error: true,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

// ---------------------------------------------------------------------------
// BootstrapPhase
// ---------------------------------------------------------------------------

/// Where the bootstrapper is in its once-per-load lifecycle.
///
/// Transitions are strictly ordered, no skipping and no going back:
///
/// ```text
/// Unhydrated → HydratedUnverified → Verified
/// ```
///
/// - **Unhydrated**: persisted state hasn't been restored yet. Nothing
///   about the session can be trusted.
/// - **HydratedUnverified**: restored, and verification has been claimed
///   by exactly one caller. A profile fetch may be in flight.
/// - **Verified**: the verification decision has run to completion.
///   Terminal for the lifetime of the page/process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapPhase {
    Unhydrated,
    HydratedUnverified,
    Verified,
}

impl BootstrapPhase {
    /// Returns `true` once verification has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified)
    }

    /// The next phase, or `None` from the terminal phase.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Unhydrated => Some(Self::HydratedUnverified),
            Self::HydratedUnverified => Some(Self::Verified),
            Self::Verified => None,
        }
    }

    /// Returns `true` if moving to `target` is a legal single step.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl std::fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unhydrated => write!(f, "Unhydrated"),
            Self::HydratedUnverified => write!(f, "HydratedUnverified"),
            Self::Verified => write!(f, "Verified"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_next_follows_strict_order() {
        assert_eq!(
            BootstrapPhase::Unhydrated.next(),
            Some(BootstrapPhase::HydratedUnverified)
        );
        assert_eq!(
            BootstrapPhase::HydratedUnverified.next(),
            Some(BootstrapPhase::Verified)
        );
        assert_eq!(BootstrapPhase::Verified.next(), None);
    }

    #[test]
    fn test_phase_can_transition_to() {
        assert!(BootstrapPhase::Unhydrated
            .can_transition_to(BootstrapPhase::HydratedUnverified));
        assert!(!BootstrapPhase::Unhydrated
            .can_transition_to(BootstrapPhase::Verified));
        assert!(!BootstrapPhase::Verified
            .can_transition_to(BootstrapPhase::Unhydrated));
    }

    #[test]
    fn test_phase_only_verified_is_terminal() {
        assert!(!BootstrapPhase::Unhydrated.is_terminal());
        assert!(!BootstrapPhase::HydratedUnverified.is_terminal());
        assert!(BootstrapPhase::Verified.is_terminal());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(BootstrapPhase::HydratedUnverified.to_string(), "HydratedUnverified");
    }

    #[test]
    fn test_verify_config_default_logs_out_without_retry() {
        let config = VerifyConfig::default();
        assert_eq!(config.transport_retries, 0);
        assert!(!config.keep_session_on_transport_error);
    }

    #[test]
    fn test_verify_config_tolerant() {
        let config = VerifyConfig::tolerant(2);
        assert_eq!(config.transport_retries, 2);
        assert!(config.keep_session_on_transport_error);
        assert_eq!(config.retry_backoff, VerifyConfig::default().retry_backoff);
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let config = VerifyConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(500));
        assert_eq!(config.backoff(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let config = VerifyConfig {
            retry_backoff: Duration::MAX,
            ..VerifyConfig::tolerant(u32::MAX)
        };
        assert_eq!(config.backoff(2), Duration::MAX);
        assert_eq!(config.backoff(u32::MAX), Duration::MAX);
    }
}
