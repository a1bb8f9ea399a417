//! # somig-types: Core types for `somig`
//!
//! This crate contains the shared vocabulary of the migration engine:
//! - Documents ([`MigratableDocument`], [`Reference`], [`SchemaVersion`])
//! - Index layout ([`IndexName`], [`IndexDescriptor`], [`AliasAction`], [`Mappings`])
//! - Store handles ([`PitId`], [`TaskId`], [`SortKey`])
//! - Action outcomes ([`ActionResponse`], [`ActionError`], [`DocumentTransformError`])
//! - Retry behaviour ([`RetryPolicy`])
//!
//! Nothing in here performs IO. The kernel depends on this crate only.

mod document;
mod index;
mod outcome;
mod retry;
mod version;

pub use document::{MigratableDocument, Reference};
pub use index::{
    AliasAction, IndexDescriptor, IndexName, IndexStatus, Mappings, PitId, SortKey, TaskId,
};
pub use outcome::{
    ActionError, ActionResponse, ActionResult, DocumentTransformError, ReadBatch,
    TransformErrorKind, TransformedBatch,
};
pub use retry::RetryPolicy;
pub use version::{SchemaVersion, VersionParseError};

#[cfg(test)]
mod tests;
