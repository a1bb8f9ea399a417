//! The document store capability consumed by the migration engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use somig_types::{
    AliasAction, IndexDescriptor, IndexName, IndexStatus, Mappings, MigratableDocument, PitId,
    SortKey, TaskId,
};

use crate::{AckResponse, BulkResponse, Refresh, SearchPage, StoreResult, TaskStatus};

/// Primitive operations against the search engine.
///
/// Implementations must not retry internally: the engine classifies every
/// failure itself and decides whether to re-issue the call. All operations
/// are expected to be safe to replay.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lists every index whose name, or one of whose aliases, starts with
    /// `prefix`.
    async fn fetch_indices(&self, prefix: &str) -> StoreResult<Vec<IndexDescriptor>>;

    /// Waits until `index` reaches at least `status`.
    async fn wait_for_index_status(
        &self,
        index: &IndexName,
        status: IndexStatus,
        timeout: Duration,
    ) -> StoreResult<()>;

    /// Creates `index` with `mappings`, pointing `aliases` at it.
    async fn create_index(
        &self,
        index: &IndexName,
        mappings: &Mappings,
        aliases: &[String],
    ) -> StoreResult<AckResponse>;

    /// Adds a write block to `index`.
    async fn add_write_block(&self, index: &IndexName, timeout: Duration)
    -> StoreResult<AckResponse>;

    async fn remove_write_block(&self, index: &IndexName) -> StoreResult<AckResponse>;

    /// Clones a write-blocked `source` into a new `target`.
    ///
    /// The clone copies documents, mappings and the write block; it does not
    /// copy aliases.
    async fn clone_index(
        &self,
        source: &IndexName,
        target: &IndexName,
        timeout: Duration,
    ) -> StoreResult<AckResponse>;

    /// Starts a server-side copy of `source` into `target`.
    async fn reindex(&self, source: &IndexName, target: &IndexName) -> StoreResult<TaskId>;

    /// Waits up to `timeout` for `task` and reports its status.
    async fn get_task(&self, task: &TaskId, timeout: Duration) -> StoreResult<TaskStatus>;

    async fn open_point_in_time(&self, index: &IndexName, keep_alive: &str) -> StoreResult<PitId>;

    /// Closes `pit`. Closing an unknown or expired PIT succeeds.
    async fn close_point_in_time(&self, pit: &PitId) -> StoreResult<()>;

    /// Reads the next page of at most `size` hits after `search_after`.
    async fn search_after(
        &self,
        pit: &PitId,
        search_after: Option<SortKey>,
        size: usize,
        keep_alive: &str,
    ) -> StoreResult<SearchPage>;

    /// Creates `documents` in `index`; per-document failures are reported in
    /// the response, not as an error.
    async fn bulk_index(
        &self,
        index: &IndexName,
        documents: &[MigratableDocument],
        refresh: Refresh,
    ) -> StoreResult<BulkResponse>;

    /// Applies all `actions` atomically.
    async fn update_aliases(&self, actions: &[AliasAction]) -> StoreResult<AckResponse>;

    async fn refresh(&self, index: &IndexName) -> StoreResult<()>;
}

/// A store shared between the executors of concurrently migrating indices.
pub type SharedStore = Arc<dyn DocumentStore>;
