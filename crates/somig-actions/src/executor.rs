//! One executor per store call.
//!
//! Every executor performs a single store call bounded by the action
//! timeout, then turns the response or failure into an
//! [`ActionResult`]. Executors never retry and never panic; retry decisions
//! belong to the state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use somig_store::{DocumentStore, Refresh, StoreError, StoreResult};
use somig_transform::TransformPipeline;
use somig_types::{
    ActionError, ActionResponse, ActionResult, AliasAction, IndexName, IndexStatus, Mappings,
    MigratableDocument, PitId, ReadBatch, RetryPolicy, SortKey, TaskId,
};
use tracing::{debug, warn};

use crate::classify::{Scope, classify};

/// Keep-alive lease requested for every point-in-time.
pub const DEFAULT_PIT_KEEP_ALIVE: &str = "10m";

/// Default bound on a single store call.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Executes migration actions against a [`DocumentStore`].
pub struct Actions<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    pipeline: TransformPipeline,
    timeout: Duration,
    policy: RetryPolicy,
    keep_alive: String,
}

impl<S: DocumentStore + ?Sized> Clone for Actions<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pipeline: self.pipeline.clone(),
            timeout: self.timeout,
            policy: self.policy.clone(),
            keep_alive: self.keep_alive.clone(),
        }
    }
}

impl<S: DocumentStore + ?Sized> Actions<S> {
    pub fn new(store: Arc<S>, pipeline: TransformPipeline) -> Self {
        Self {
            store,
            pipeline,
            timeout: DEFAULT_ACTION_TIMEOUT,
            policy: RetryPolicy::default(),
            keep_alive: DEFAULT_PIT_KEEP_ALIVE.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // ------------------------------------------------------------------------
    // Initialisation
    // ------------------------------------------------------------------------

    /// Lists indices and aliases under `prefix`.
    pub async fn fetch_indices(&self, prefix: &str) -> ActionResult {
        let index = IndexName::new(prefix);
        let indices = self
            .bounded(self.store.fetch_indices(prefix))
            .await
            .map_err(|e| self.fail(e, &index, Scope::General))?;
        Ok(ActionResponse::Indices(indices))
    }

    /// Waits for `index` to reach at least yellow health.
    pub async fn wait_for_index_status(&self, index: &IndexName, status: IndexStatus) -> ActionResult {
        self.bounded(self.store.wait_for_index_status(index, status, self.timeout))
            .await
            .map_err(|e| match e {
                StoreError::Timeout => ActionError::retryable(format!(
                    "index_not_{status}_timeout: {index} did not reach {status}"
                )),
                other => self.fail(other, index, Scope::General),
            })?;
        Ok(ActionResponse::IndexReady)
    }

    // ------------------------------------------------------------------------
    // Index management
    // ------------------------------------------------------------------------

    /// Creates `index`; an index that already exists counts as created.
    ///
    /// Waits for the new index to become at least yellow before returning.
    pub async fn create_index(
        &self,
        index: &IndexName,
        mappings: &Mappings,
        aliases: &[String],
    ) -> ActionResult {
        match self.bounded(self.store.create_index(index, mappings, aliases)).await {
            Ok(ack) if !ack.acknowledged => {
                return Err(ActionError::retryable(format!(
                    "create_index_not_acknowledged: {index}"
                )));
            }
            Ok(_) => {}
            Err(e) if e.is_type("resource_already_exists_exception") => {
                debug!(index = %index, "index already exists, continuing");
            }
            Err(e) => return Err(self.fail(e, index, Scope::Mappings)),
        }
        self.wait_for_index_status(index, IndexStatus::Yellow).await?;
        Ok(ActionResponse::IndexCreated)
    }

    /// Blocks writes to `index`.
    ///
    /// `acknowledged: true` is success even when the shards did not confirm:
    /// a repeated block on an already blocked index reports exactly that.
    pub async fn set_write_block(&self, index: &IndexName) -> ActionResult {
        let ack = self
            .bounded(self.store.add_write_block(index, self.timeout))
            .await
            .map_err(|e| self.fail(e, index, Scope::General))?;
        if ack.acknowledged {
            Ok(ActionResponse::WriteBlockSet)
        } else {
            Err(ActionError::retryable(format!("set_write_block_failed: {index}")))
        }
    }

    pub async fn remove_write_block(&self, index: &IndexName) -> ActionResult {
        let ack = self
            .bounded(self.store.remove_write_block(index))
            .await
            .map_err(|e| self.fail(e, index, Scope::General))?;
        if ack.acknowledged {
            Ok(ActionResponse::WriteBlockRemoved)
        } else {
            Err(ActionError::retryable(format!("remove_write_block_failed: {index}")))
        }
    }

    /// Clones the write-blocked `source` into `target`.
    ///
    /// A target that already exists counts as cloned.
    pub async fn clone_index(&self, source: &IndexName, target: &IndexName) -> ActionResult {
        match self
            .bounded(self.store.clone_index(source, target, self.timeout))
            .await
        {
            Ok(ack) if !ack.acknowledged => {
                return Err(ActionError::retryable(format!("clone_index_not_acknowledged: {target}")));
            }
            Ok(_) => {}
            Err(e) if e.is_type("resource_already_exists_exception") => {
                debug!(source = %source, target = %target, "clone target already exists, continuing");
            }
            Err(e) if e.is_type("index_not_found_exception") => {
                return Err(ActionError::IndexNotFound {
                    index: source.clone(),
                });
            }
            Err(e) => return Err(self.fail(e, target, Scope::General)),
        }
        self.wait_for_index_status(target, IndexStatus::Yellow).await?;
        Ok(ActionResponse::IndexCloned)
    }

    /// Starts a server-side reindex of `source` into `target`.
    pub async fn reindex(&self, source: &IndexName, target: &IndexName) -> ActionResult {
        let task = self
            .bounded(self.store.reindex(source, target))
            .await
            .map_err(|e| self.fail(e, source, Scope::General))?;
        Ok(ActionResponse::ReindexStarted(task))
    }

    /// Polls `task` once, waiting at most the action timeout.
    pub async fn wait_for_task(&self, task: &TaskId) -> ActionResult {
        let task_index = IndexName::new(task.as_str());
        let status = self
            .bounded(self.store.get_task(task, self.timeout))
            .await
            .map_err(|e| self.fail(e, &task_index, Scope::General))?;

        if !status.completed {
            return Err(ActionError::TaskStillRunning { task: task.clone() });
        }
        if let Some(error) = status.error {
            return Err(ActionError::unexpected(format!("task {task} failed: {error}")));
        }
        if let Some(first) = status.failures.first() {
            return Err(ActionError::unexpected(format!(
                "task {task} completed with {} failures, first: {first}",
                status.failures.len()
            )));
        }
        Ok(ActionResponse::TaskCompleted)
    }

    /// Atomically applies `actions`.
    pub async fn update_aliases(&self, actions: &[AliasAction]) -> ActionResult {
        let first_index = actions
            .iter()
            .map(|action| match action {
                AliasAction::Add { index, .. }
                | AliasAction::Remove { index, .. }
                | AliasAction::RemoveIndex { index } => index.clone(),
            })
            .next()
            .unwrap_or_else(|| IndexName::new(""));

        match self.bounded(self.store.update_aliases(actions)).await {
            Ok(ack) if ack.acknowledged => Ok(ActionResponse::AliasesUpdated),
            Ok(_) => Err(ActionError::retryable("update_aliases_not_acknowledged")),
            Err(e) if e.is_type("aliases_not_found_exception") => {
                let alias = actions
                    .iter()
                    .find_map(|action| match action {
                        AliasAction::Remove {
                            alias,
                            must_exist: true,
                            ..
                        } => Some(alias.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                Err(ActionError::AliasNotFound { alias })
            }
            Err(e) => Err(self.fail(e, &first_index, Scope::General)),
        }
    }

    pub async fn refresh(&self, index: &IndexName) -> ActionResult {
        self.bounded(self.store.refresh(index))
            .await
            .map_err(|e| self.fail(e, index, Scope::General))?;
        Ok(ActionResponse::Refreshed)
    }

    // ------------------------------------------------------------------------
    // Document movement
    // ------------------------------------------------------------------------

    /// Opens a point-in-time over `index`.
    pub async fn open_pit(&self, index: &IndexName) -> ActionResult {
        let pit = self
            .bounded(self.store.open_point_in_time(index, &self.keep_alive))
            .await
            .map_err(|e| self.fail(e, index, Scope::General))?;
        Ok(ActionResponse::PitOpened(pit))
    }

    /// Reads the next page of at most `batch_size` documents.
    pub async fn read_batch(
        &self,
        pit: &PitId,
        search_after: Option<SortKey>,
        batch_size: usize,
    ) -> ActionResult {
        let pit_index = IndexName::new(pit.as_str());
        let page = self
            .bounded(
                self.store
                    .search_after(pit, search_after, batch_size, &self.keep_alive),
            )
            .await
            .map_err(|e| self.fail(e, &pit_index, Scope::General))?;

        let last_sort = page.hits.last().map(|hit| hit.sort);
        Ok(ActionResponse::BatchRead(ReadBatch {
            documents: page.hits.into_iter().map(|hit| hit.document).collect(),
            last_sort,
            total: page.total,
            pit: page.pit_id,
        }))
    }

    /// Runs the transform pipeline on the blocking pool; no store call.
    pub async fn transform_batch(&self, documents: Vec<MigratableDocument>) -> ActionResult {
        let pipeline = self.pipeline.clone();
        let batch = tokio::task::spawn_blocking(move || pipeline.transform_batch(documents))
            .await
            .map_err(|e| ActionError::unexpected(format!("transform task failed: {e}")))?;
        Ok(ActionResponse::BatchTransformed(batch))
    }

    /// Writes `documents` into `index` with create semantics.
    ///
    /// A document that already exists is skipped: the write is being
    /// replayed after a retry or by a concurrent migrator.
    pub async fn bulk_write(&self, index: &IndexName, documents: &[MigratableDocument]) -> ActionResult {
        if documents.is_empty() {
            return Ok(ActionResponse::BatchWritten { count: 0 });
        }

        let response = self
            .bounded(self.store.bulk_index(index, documents, Refresh::False))
            .await
            .map_err(|e| self.fail(e, index, Scope::General))?;

        let mut conflicts = 0usize;
        for (id, error) in response.failures() {
            match error.error_type() {
                Some("version_conflict_engine_exception") => conflicts += 1,
                Some("cluster_block_exception") => {
                    return Err(ActionError::TargetIndexHadWriteBlock {
                        index: index.clone(),
                    });
                }
                Some("index_not_found_exception") => {
                    return Err(ActionError::IndexNotFound {
                        index: index.clone(),
                    });
                }
                _ => {
                    return Err(ActionError::unexpected(format!(
                        "bulk write of document {id} into {index} failed: {error}"
                    )));
                }
            }
        }

        if conflicts > 0 {
            debug!(index = %index, conflicts, "skipped documents that already exist");
        }
        Ok(ActionResponse::BatchWritten {
            count: documents.len(),
        })
    }

    /// Closes `pit`; a PIT that no longer exists counts as closed.
    pub async fn close_pit(&self, pit: &PitId) -> ActionResult {
        match self.bounded(self.store.close_point_in_time(pit)).await {
            Ok(()) => Ok(ActionResponse::PitClosed),
            Err(e) if e.status() == Some(404) => {
                warn!(pit = %pit, "point-in-time already gone");
                Ok(ActionResponse::PitClosed)
            }
            Err(e) => Err(self.fail(e, &IndexName::new(pit.as_str()), Scope::General)),
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    fn fail(&self, error: StoreError, index: &IndexName, scope: Scope) -> ActionError {
        classify(&self.policy, error, index, scope)
    }
}
