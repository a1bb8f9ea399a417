//! # somig-store: Document store client adapter
//!
//! The migration engine talks to the search engine only through the
//! [`DocumentStore`] trait. Every method performs exactly one store call and
//! reports failure as a wire-level [`StoreError`]; classification into
//! retryable and fatal kinds happens in the action executors.
//!
//! The store client never retries on its own.
//!
//! - [`traits`]: the [`DocumentStore`] capability
//! - [`types`]: request/response shapes ([`AckResponse`], [`SearchPage`], [`BulkResponse`])
//! - [`error`]: [`StoreError`]
//! - [`memory`]: [`InMemoryStore`], a complete in-process implementation
//! - [`fault`]: scripted and probabilistic fault injection for [`InMemoryStore`]

pub mod error;
pub mod fault;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use fault::{FaultPlan, Operation};
pub use memory::InMemoryStore;
pub use traits::{DocumentStore, SharedStore};
pub use types::{AckResponse, BulkItem, BulkResponse, Hit, Refresh, SearchPage, TaskStatus};
