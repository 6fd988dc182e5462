//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use authkeep_refresh::RefreshConfig;
use authkeep_session::SessionConfig;

pub const DEFAULT_PROFILE_PATH: &str = "/api/auth/me";
pub const DEFAULT_STORAGE_DIR: &str = ".authkeep";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

const VAR_API_BASE_URL: &str = "AUTHKEEP_API_BASE_URL";
const VAR_PROFILE_PATH: &str = "AUTHKEEP_PROFILE_PATH";
const VAR_STORAGE_DIR: &str = "AUTHKEEP_STORAGE_DIR";
const VAR_STORAGE_KEY: &str = "AUTHKEEP_STORAGE_KEY";
const VAR_TOKEN_KEY: &str = "AUTHKEEP_TOKEN_KEY";
const VAR_REQUEST_TIMEOUT_SECS: &str = "AUTHKEEP_REQUEST_TIMEOUT_SECS";
const VAR_REFRESH_INTERVAL_SECS: &str = "AUTHKEEP_REFRESH_INTERVAL_SECS";

/// A configuration variable was missing or unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: String },

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

/// Everything the client needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend origin, without a trailing slash.
    pub api_base_url: String,
    /// Path of the "current user" endpoint, with a leading slash.
    pub profile_path: String,
    /// Directory for [`FileStorage`](authkeep_storage::FileStorage).
    pub storage_dir: PathBuf,
    /// Storage key names.
    pub session: SessionConfig,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
}

impl ClientConfig {
    /// Config for `api_base_url` with every other setting at its default.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            profile_path: DEFAULT_PROFILE_PATH.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            session: SessionConfig::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
        }
    }

    /// Build typed client config from environment variables.
    ///
    /// Required:
    /// - `AUTHKEEP_API_BASE_URL`: `http://` or `https://` origin
    ///
    /// Optional:
    /// - `AUTHKEEP_PROFILE_PATH`: default `/api/auth/me`
    /// - `AUTHKEEP_STORAGE_DIR`: default `.authkeep`
    /// - `AUTHKEEP_STORAGE_KEY`: default `auth-storage`
    /// - `AUTHKEEP_TOKEN_KEY`: default `token`
    /// - `AUTHKEEP_REQUEST_TIMEOUT_SECS`: default 15, at most 600
    /// - `AUTHKEEP_REFRESH_INTERVAL_SECS`: default 300, at most 86400
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup`. Blank values count as unset.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base = get(VAR_API_BASE_URL).ok_or_else(|| ConfigError::Missing {
            var: VAR_API_BASE_URL.into(),
        })?;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid(VAR_API_BASE_URL, &base));
        }

        let mut config = Self::new(base);
        if let Some(path) = get(VAR_PROFILE_PATH) {
            config.profile_path = if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            };
        }
        if let Some(dir) = get(VAR_STORAGE_DIR) {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(key) = get(VAR_STORAGE_KEY) {
            config.session.storage_key = key;
        }
        if let Some(key) = get(VAR_TOKEN_KEY) {
            config.session.token_key = key;
        }
        if let Some(raw) = get(VAR_REQUEST_TIMEOUT_SECS) {
            config.request_timeout =
                parse_secs(VAR_REQUEST_TIMEOUT_SECS, &raw, MAX_REQUEST_TIMEOUT_SECS)?;
        }
        if let Some(raw) = get(VAR_REFRESH_INTERVAL_SECS) {
            config.refresh_interval = parse_secs(
                VAR_REFRESH_INTERVAL_SECS,
                &raw,
                RefreshConfig::MAX_INTERVAL.as_secs(),
            )?;
        }
        Ok(config)
    }

    /// Full URL of the "current user" endpoint.
    pub fn profile_url(&self) -> String {
        format!("{}{}", self.api_base_url, self.profile_path)
    }

    /// Refresh settings derived from this config.
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::with_interval(self.refresh_interval)
    }
}

/// Whole seconds in `1..=max`.
fn parse_secs(var: &str, raw: &str, max: u64) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if (1..=max).contains(&secs) => Ok(Duration::from_secs(secs)),
        _ => Err(invalid(var, raw)),
    }
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        var: var.into(),
        value: value.into(),
    }
}
