//! Hook for fetching the current user's profile from the backend.
//!
//! authkeep doesn't talk HTTP itself at this layer. The session store only
//! needs to know "given this token, who is the user?", and the
//! [`ProfileFetcher`] trait is that question. The meta crate ships an HTTP
//! implementation; tests use hand-written mocks.

use std::sync::Arc;

use authkeep_protocol::User;

use crate::FetchError;

/// Asks the backend who the holder of a token is.
///
/// # Trait bounds
///
/// - `Send + Sync` → one fetcher is shared by the bootstrapper and the
///   background refresher, which may call it concurrently.
/// - `'static` → it lives as long as the client.
///
/// # Example
///
/// ```rust
/// use authkeep_protocol::User;
/// use authkeep_session::{FetchError, ProfileFetcher};
///
/// /// Knows exactly one token. Handy in tests.
/// struct FixedFetcher;
///
/// impl ProfileFetcher for FixedFetcher {
///     async fn fetch_current_user(&self, token: &str) -> Result<User, FetchError> {
///         if token == "good" {
///             Ok(User::new("1", "ada"))
///         } else {
///             Err(FetchError::Unauthorized("unknown token".into()))
///         }
///     }
/// }
/// ```
pub trait ProfileFetcher: Send + Sync + 'static {
    /// Fetches the profile of whoever `token` belongs to.
    ///
    /// # Returns
    /// - `Ok(User)`: the token is valid, here's the current record
    /// - `Err(FetchError::Unauthorized)`: the backend rejected the token
    /// - `Err(FetchError::Transport | InvalidResponse)`: no usable answer
    fn fetch_current_user(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<User, FetchError>> + Send;
}

/// Shared fetchers are fetchers too, so one instance can back both the
/// bootstrapper and the refresher.
impl<F: ProfileFetcher> ProfileFetcher for Arc<F> {
    fn fetch_current_user(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<User, FetchError>> + Send {
        (**self).fetch_current_user(token)
    }
}
