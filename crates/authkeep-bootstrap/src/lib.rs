//! Session bootstrapping for authkeep.
//!
//! Runs once per application load: restores the persisted session, then
//! decides whether the restored credential has to be checked against the
//! backend.
//!
//! # Key types
//!
//! - [`Bootstrapper`]: drives restore + verify exactly once
//! - [`BootstrapPhase`]: the linear lifecycle state machine
//! - [`VerificationPlan`]: the pure "fetch / trust / nothing" decision
//! - [`VerifyConfig`]: what to do when the profile fetch fails

mod bootstrapper;
mod config;

pub use bootstrapper::{Bootstrapper, VerificationOutcome, VerificationPlan};
pub use config::{BootstrapPhase, VerifyConfig};
