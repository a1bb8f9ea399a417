//! Classification of store failures into [`ActionError`] kinds.
//!
//! Specific error types are matched first so that, for example, a
//! `cluster_block_exception` (HTTP 403) is not mistaken for a transient
//! authorization failure. Only then do the policy's retryable error types
//! and statuses apply. Anything left over is unexpected and fatal.

use somig_store::StoreError;
use somig_types::{ActionError, IndexName, RetryPolicy};

/// Which store operation failed; mapping errors only mean a conflict on
/// operations that send mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    General,
    Mappings,
}

/// Maps a store failure on `index` to an [`ActionError`].
pub fn classify(policy: &RetryPolicy, error: StoreError, index: &IndexName, scope: Scope) -> ActionError {
    let (status, error_type, reason) = match error {
        StoreError::Response {
            status,
            error_type,
            reason,
        } => (status, error_type, reason),
        transport => return ActionError::retryable(transport.to_string()),
    };

    match error_type.as_str() {
        "index_not_found_exception" => ActionError::IndexNotFound {
            index: index.clone(),
        },
        "cluster_block_exception" => ActionError::ClusterBlock {
            index: index.clone(),
            reason,
        },
        "mapper_parsing_exception" | "illegal_argument_exception" if scope == Scope::Mappings => {
            ActionError::MappingConflict {
                index: index.clone(),
                reason,
            }
        }
        "aliases_not_found_exception" => ActionError::AliasNotFound { alias: reason },
        t if policy.is_retryable_error_type(t) || policy.is_retryable_status(status) => {
            ActionError::retryable(format!("[{status}] {t}: {reason}"))
        }
        t => ActionError::unexpected(format!("[{status}] {t}: {reason}")),
    }
}
