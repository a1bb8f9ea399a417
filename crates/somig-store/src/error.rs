//! Wire-level store errors.

use somig_types::IndexName;
use thiserror::Error;

/// A failure reported by the document store or the transport in front of it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The connection was reset or refused.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Every node of the connection pool is marked dead.
    #[error("no living connections")]
    NoLivingConnections,

    /// The store answered with an error body.
    #[error("[{status}] {error_type}: {reason}")]
    Response {
        status: u16,
        error_type: String,
        reason: String,
    },
}

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn response(status: u16, error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Response {
            status,
            error_type: error_type.into(),
            reason: reason.into(),
        }
    }

    pub fn index_not_found(index: &IndexName) -> Self {
        Self::response(404, "index_not_found_exception", format!("no such index [{index}]"))
    }

    pub fn resource_already_exists(index: &IndexName) -> Self {
        Self::response(
            400,
            "resource_already_exists_exception",
            format!("index [{index}] already exists"),
        )
    }

    pub fn write_block(index: &IndexName) -> Self {
        Self::response(
            403,
            "cluster_block_exception",
            format!("index [{index}] blocked by: [FORBIDDEN/8/index write (api)]"),
        )
    }

    pub fn version_conflict(id: &str) -> Self {
        Self::response(
            409,
            "version_conflict_engine_exception",
            format!("[{id}]: version conflict, document already exists"),
        )
    }

    pub fn aliases_not_found(alias: &str) -> Self {
        Self::response(404, "aliases_not_found_exception", format!("aliases [{alias}] missing"))
    }

    pub fn unavailable() -> Self {
        Self::response(503, "unavailable_shards_exception", "primary shard is not active")
    }

    /// The store's error type, for [`StoreError::Response`] only.
    pub fn error_type(&self) -> Option<&str> {
        match self {
            StoreError::Response { error_type, .. } => Some(error_type),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_type(&self, error_type: &str) -> bool {
        self.error_type() == Some(error_type)
    }
}
