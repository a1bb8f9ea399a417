//! Request and response shapes of the store adapter.

use serde::{Deserialize, Serialize};
use somig_types::{MigratableDocument, PitId, SortKey};

use crate::StoreError;

/// Acknowledgement returned by index-level operations.
///
/// `shards_acknowledged` reports whether the shard copies confirmed the
/// change before the timeout. It is `false` for a repeated write block on an
/// index that is already blocked, even though the block is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub acknowledged: bool,
    pub shards_acknowledged: bool,
}

impl AckResponse {
    pub const ACKNOWLEDGED: AckResponse = AckResponse {
        acknowledged: true,
        shards_acknowledged: true,
    };
}

/// Status of an asynchronous store task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskStatus {
    pub completed: bool,
    #[serde(default)]
    pub failures: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One hit of a PIT search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub document: MigratableDocument,
    pub sort: SortKey,
}

/// One page of a `search_after` scan over a PIT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub hits: Vec<Hit>,
    pub total: u64,
    pub pit_id: PitId,
}

/// Refresh behaviour of a bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refresh {
    True,
    #[default]
    False,
    WaitFor,
}

/// Per-document result of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub id: String,
    pub result: Result<(), StoreError>,
}

/// Result of a bulk request; the request itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|item| item.result.is_err())
    }

    /// Iterates over failed items.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &StoreError)> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().err().map(|e| (item.id.as_str(), e)))
    }
}
