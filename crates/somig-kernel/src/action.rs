//! Actions requested by the state machine.
//!
//! An action describes exactly one executor call. The kernel produces
//! actions but never executes them; the runner does.

use serde::{Deserialize, Serialize};
use somig_types::{
    AliasAction, IndexName, IndexStatus, Mappings, MigratableDocument, PitId, SortKey, TaskId,
};

/// One executor call for the runner to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    // ========================================================================
    // Initialisation
    // ========================================================================
    /// List the indices and aliases under the index prefix.
    FetchIndices { prefix: String },

    /// Wait for an index to reach the given health.
    WaitForIndexStatus {
        index: IndexName,
        status: IndexStatus,
    },

    // ========================================================================
    // Index Management
    // ========================================================================
    CreateIndex {
        index: IndexName,
        mappings: Mappings,
        aliases: Vec<String>,
    },

    SetWriteBlock { index: IndexName },

    RemoveWriteBlock { index: IndexName },

    /// Clone a write-blocked index.
    CloneIndex { source: IndexName, target: IndexName },

    /// Start a server-side copy; answered with a task handle.
    Reindex { source: IndexName, target: IndexName },

    WaitForTask { task: TaskId },

    /// Apply alias changes atomically.
    UpdateAliases { actions: Vec<AliasAction> },

    RefreshIndex { index: IndexName },

    // ========================================================================
    // Document Movement
    // ========================================================================
    OpenPit { index: IndexName },

    ReadBatch {
        pit: PitId,
        search_after: Option<SortKey>,
        batch_size: usize,
    },

    /// Run the transform pipeline over a page of documents (no IO).
    TransformBatch { documents: Vec<MigratableDocument> },

    /// Create documents in an index.
    BulkWrite {
        index: IndexName,
        documents: Vec<MigratableDocument>,
    },

    ClosePit { pit: PitId },
}

impl Action {
    /// Short name used in logs and progress reports.
    pub fn name(&self) -> &'static str {
        match self {
            Action::FetchIndices { .. } => "fetch_indices",
            Action::WaitForIndexStatus { .. } => "wait_for_index_status",
            Action::CreateIndex { .. } => "create_index",
            Action::SetWriteBlock { .. } => "set_write_block",
            Action::RemoveWriteBlock { .. } => "remove_write_block",
            Action::CloneIndex { .. } => "clone_index",
            Action::Reindex { .. } => "reindex",
            Action::WaitForTask { .. } => "wait_for_task",
            Action::UpdateAliases { .. } => "update_aliases",
            Action::RefreshIndex { .. } => "refresh_index",
            Action::OpenPit { .. } => "open_pit",
            Action::ReadBatch { .. } => "read_batch",
            Action::TransformBatch { .. } => "transform_batch",
            Action::BulkWrite { .. } => "bulk_write",
            Action::ClosePit { .. } => "close_pit",
        }
    }
}

