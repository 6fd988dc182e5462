//! HTTP profile fetcher.
//!
//! Thin `reqwest` wrapper for the "current user" endpoint. Status mapping
//! and body parsing are pure functions so they can be tested without a
//! server.

use authkeep_protocol::User;
use authkeep_session::{FetchError, ProfileFetcher};

use crate::{AuthkeepError, ClientConfig};

/// Longest slice of an error body carried into a [`FetchError`].
const ERROR_BODY_LIMIT: usize = 200;

// =============================================================================
// CLIENT
// =============================================================================

/// Fetches the current user with `GET {profile_url}` and a bearer token.
#[derive(Debug, Clone)]
pub struct HttpProfileClient {
    http: reqwest::Client,
    profile_url: String,
}

impl HttpProfileClient {
    /// Builds a client with the config's endpoint and request timeout.
    ///
    /// # Errors
    /// Returns [`AuthkeepError::Http`] if the TLS backend can't be set up.
    pub fn new(config: &ClientConfig) -> Result<Self, AuthkeepError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(http, config.profile_url()))
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, profile_url: impl Into<String>) -> Self {
        Self {
            http,
            profile_url: profile_url.into(),
        }
    }

    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }
}

impl ProfileFetcher for HttpProfileClient {
    async fn fetch_current_user(&self, token: &str) -> Result<User, FetchError> {
        let response = self
            .http
            .get(&self.profile_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        tracing::debug!(status, "profile response");
        check_status(status, &body)?;
        parse_profile_response(&body)
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Maps an HTTP status to the fetch error taxonomy.
///
/// 401 and 403 mean the backend rejected the credential. Every other
/// non-2xx status is treated as the backend being unable to answer.
pub fn check_status(status: u16, body: &str) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(FetchError::Unauthorized(format!("HTTP {status}"))),
        _ => Err(FetchError::Transport(format!(
            "HTTP {status}: {}",
            truncate(body)
        ))),
    }
}

/// Parses a profile body.
///
/// Accepts a bare user object or one wrapped as `{"user": …}` or
/// `{"data": …}`.
pub fn parse_profile_response(body: &str) -> Result<User, FetchError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

    let record = match value {
        serde_json::Value::Object(mut map) if !map.contains_key("id") => {
            match map.remove("user").or_else(|| map.remove("data")) {
                Some(inner) => inner,
                None => serde_json::Value::Object(map),
            }
        }
        other => other,
    };

    serde_json::from_value(record).map_err(|e| FetchError::InvalidResponse(e.to_string()))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
