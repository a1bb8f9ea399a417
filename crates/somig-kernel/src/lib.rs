//! # somig-kernel: Migration state machine
//!
//! The kernel is the pure, deterministic heart of a saved-objects
//! migration. It receives the outcome of the last action and produces the
//! next state plus the next action to execute.
//!
//! ## Key Principles
//!
//! - **No IO**: The kernel never talks to the document store
//! - **No clocks**: Backoff delays are computed, the runner sleeps
//! - **No randomness**: Same input always produces same output
//! - **Pure functions**: `apply(state, outcome) -> (state, next_action)`
//!
//! ## Architecture
//!
//! - [`state`]: [`State`], [`ControlState`], [`MigrationSettings`], [`FatalReason`]
//! - [`action`]: [`Action`]s for the runner to execute
//! - [`kernel`]: [`apply`], [`next_action`] and [`cancel`]

pub mod action;
pub mod kernel;
pub mod state;


pub use action::Action;
pub use kernel::{apply, cancel, next_action};
pub use state::{
    ControlState, FatalReason, LogEntry, LogLevel, MAX_LOG_ENTRIES, MigrationSettings, State,
    TRANSFORM_ERROR_SAMPLE_SIZE,
};
