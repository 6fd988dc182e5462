//! Persisted client session for authkeep.
//!
//! This crate owns the client's idea of who is logged in:
//!
//! 1. **State**: `{user, token, isAuthenticated}` and the pure rules for
//!    changing it ([`apply`], [`reconcile`])
//! 2. **Store**: the live, shared, self-persisting copy
//!    ([`SessionStore`])
//! 3. **Profile lookup**: the seam the layers above use to ask the
//!    backend who a token belongs to ([`ProfileFetcher`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Bootstrap / Refresh (above)  ← verify and refresh the session
//!     ↕
//! Session Layer (this crate)   ← holds and persists the session
//!     ↕
//! Protocol + Storage (below)   ← record format and durable slots
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod fetch;
mod state;
mod store;

pub use error::{FetchError, SessionError};
pub use fetch::ProfileFetcher;
pub use state::{
    apply, reconcile, Reconciliation, Repair, SessionAction, SessionConfig,
    TokenSlotOp, Transition,
};
pub use store::{HydrationReport, SessionStore};
