//! # authkeep
//!
//! Persisted, self-verifying client sessions.
//!
//! authkeep keeps the current user's identity and credential in memory,
//! mirrors them to durable storage on every change, restores them at
//! start-up, and checks a restored credential against the backend once per
//! load. While a session is active it can keep the cached profile fresh in
//! the background.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use authkeep::prelude::*;
//!
//! # async fn run() -> Result<(), AuthkeepError> {
//! authkeep::telemetry::init();
//!
//! let client = AuthClient::builder(ClientConfig::from_env()?)
//!     .build()
//!     .await?;
//! client.start().await?;
//!
//! if client.store().is_authenticated() {
//!     // show the signed-in UI
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod http;
pub mod telemetry;

pub use client::{AuthClient, AuthClientBuilder};
pub use config::{
    ClientConfig, ConfigError, DEFAULT_PROFILE_PATH, DEFAULT_REFRESH_INTERVAL_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STORAGE_DIR, MAX_REQUEST_TIMEOUT_SECS,
};
pub use error::AuthkeepError;
pub use http::{HttpProfileClient, check_status, parse_profile_response};

pub mod prelude {
    pub use crate::{AuthClient, AuthClientBuilder, AuthkeepError, ClientConfig, HttpProfileClient};
    pub use authkeep_bootstrap::{BootstrapPhase, VerificationOutcome, VerifyConfig};
    pub use authkeep_protocol::{Role, SessionSnapshot, User, UserId};
    pub use authkeep_refresh::{RefreshConfig, RefreshOutcome, Visibility};
    pub use authkeep_session::{FetchError, ProfileFetcher, SessionConfig, SessionStore};
    pub use authkeep_storage::{DurableStorage, FileStorage, MemoryStorage};
}
