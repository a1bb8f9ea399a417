//! Results produced by action executors and consumed by the state machine.

use serde::{Deserialize, Serialize};

use crate::{IndexDescriptor, IndexName, MigratableDocument, PitId, SchemaVersion, SortKey, TaskId};

/// Outcome of one action: a typed success payload or a typed error.
pub type ActionResult = Result<ActionResponse, ActionError>;

/// One page read from an open point-in-time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadBatch {
    pub documents: Vec<MigratableDocument>,
    /// Sort value of the last hit; `None` when the page was empty.
    pub last_sort: Option<SortKey>,
    /// Total hits visible through the PIT.
    pub total: u64,
    /// The store may hand back a refreshed PIT handle with every page.
    pub pit: PitId,
}

/// Documents that survived the transform pipeline plus per-document failures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformedBatch {
    pub documents: Vec<MigratableDocument>,
    pub errors: Vec<DocumentTransformError>,
}

/// Typed success payload of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ActionResponse {
    Indices(Vec<IndexDescriptor>),
    IndexReady,
    WriteBlockSet,
    WriteBlockRemoved,
    IndexCreated,
    IndexCloned,
    ReindexStarted(TaskId),
    TaskCompleted,
    PitOpened(PitId),
    BatchRead(ReadBatch),
    BatchTransformed(TransformedBatch),
    BatchWritten { count: usize },
    PitClosed,
    AliasesUpdated,
    Refreshed,
}

impl ActionResponse {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ActionResponse::Indices(_) => "indices",
            ActionResponse::IndexReady => "index_ready",
            ActionResponse::WriteBlockSet => "write_block_set",
            ActionResponse::WriteBlockRemoved => "write_block_removed",
            ActionResponse::IndexCreated => "index_created",
            ActionResponse::IndexCloned => "index_cloned",
            ActionResponse::ReindexStarted(_) => "reindex_started",
            ActionResponse::TaskCompleted => "task_completed",
            ActionResponse::PitOpened(_) => "pit_opened",
            ActionResponse::BatchRead(_) => "batch_read",
            ActionResponse::BatchTransformed(_) => "batch_transformed",
            ActionResponse::BatchWritten { .. } => "batch_written",
            ActionResponse::PitClosed => "pit_closed",
            ActionResponse::AliasesUpdated => "aliases_updated",
            ActionResponse::Refreshed => "refreshed",
        }
    }
}

/// Closed taxonomy of action failures.
///
/// Only [`ActionError::Retryable`] and [`ActionError::TaskStillRunning`] are
/// retried by the state machine; every other kind aborts the run unless the
/// current state handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionError {
    /// Transport failure, timeout or transient 5xx.
    #[error("retryable store error: {message}")]
    Retryable { message: String },

    #[error("index {index} not found")]
    IndexNotFound { index: IndexName },

    #[error("mapping conflict on {index}: {reason}")]
    MappingConflict { index: IndexName, reason: String },

    #[error("cluster block on {index}: {reason}")]
    ClusterBlock { index: IndexName, reason: String },

    /// An alias removal required the alias to exist and it did not.
    #[error("alias {alias} not found")]
    AliasNotFound { alias: String },

    /// A store task did not complete within the wait timeout.
    #[error("wait_for_task_completion_timeout: task {task} is still running")]
    TaskStillRunning { task: TaskId },

    /// A bulk write hit an index that already carries a write block.
    #[error("target index {index} had a write block")]
    TargetIndexHadWriteBlock { index: IndexName },

    /// Catch-all; always fatal.
    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl ActionError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ActionError::Retryable {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        ActionError::Unexpected {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::Retryable { .. } | ActionError::TaskStillRunning { .. }
        )
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::Retryable { .. } => "retryable_store_error",
            ActionError::IndexNotFound { .. } => "index_not_found",
            ActionError::MappingConflict { .. } => "mapping_conflict",
            ActionError::ClusterBlock { .. } => "cluster_block",
            ActionError::AliasNotFound { .. } => "alias_not_found",
            ActionError::TaskStillRunning { .. } => "wait_for_task_completion_timeout",
            ActionError::TargetIndexHadWriteBlock { .. } => "target_index_had_write_block",
            ActionError::Unexpected { .. } => "unexpected",
        }
    }
}

/// Why a single document could not be transformed. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformErrorKind {
    #[error("no type definition is registered")]
    UnknownType,

    #[error("document version {document} is newer than the latest known version {latest}")]
    NewerThanKnown {
        document: SchemaVersion,
        latest: SchemaVersion,
    },

    #[error("transform to {version} failed: {message}")]
    TransformFailed {
        version: SchemaVersion,
        message: String,
    },

    #[error("schema violation: {message}")]
    SchemaViolation { message: String },
}

/// A per-document transform failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("document {type_name}:{id}: {kind}")]
pub struct DocumentTransformError {
    pub id: String,
    pub type_name: String,
    pub kind: TransformErrorKind,
}

impl DocumentTransformError {
    pub fn new(doc: &MigratableDocument, kind: TransformErrorKind) -> Self {
        Self {
            id: doc.id.clone(),
            type_name: doc.type_name.clone(),
            kind,
        }
    }
}
