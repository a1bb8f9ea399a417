//! # somig-actions: Migration action executors
//!
//! Each executor wraps exactly one store call (or, for
//! [`Actions::transform_batch`], one run of the transform pipeline) and
//! returns a typed [`ActionResult`](somig_types::ActionResult). Store
//! failures are classified into the closed [`ActionError`](somig_types::ActionError)
//! taxonomy by [`classify`].
//!
//! Executors are idempotent with respect to replay: an index or clone that
//! already exists, a write block that is already set, a bulk document that
//! is already present and a PIT that is already closed all count as success.

pub mod classify;
pub mod executor;

#[cfg(test)]
mod tests;

pub use classify::{Scope, classify};
pub use executor::{Actions, DEFAULT_ACTION_TIMEOUT, DEFAULT_PIT_KEEP_ALIVE};
