//! In-process document store.
//!
//! [`InMemoryStore`] implements every [`DocumentStore`] operation against a
//! set of in-memory indices. It models the store behaviour the migration
//! engine depends on: aliases, write blocks, point-in-time snapshots,
//! clone and reindex, asynchronous tasks, and create-only bulk writes.
//! Faults are injected through a [`FaultPlan`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use somig_types::{
    AliasAction, IndexDescriptor, IndexName, IndexStatus, Mappings, MigratableDocument, PitId,
    SortKey, TaskId,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    AckResponse, BulkItem, BulkResponse, DocumentStore, FaultPlan, Hit, Operation, Refresh,
    SearchPage, StoreError, StoreResult, TaskStatus,
};

#[derive(Debug, Clone)]
struct MemIndex {
    aliases: BTreeSet<String>,
    write_block: bool,
    status: IndexStatus,
    mappings: Mappings,
    docs: BTreeMap<String, MigratableDocument>,
}

impl MemIndex {
    fn new(mappings: Mappings) -> Self {
        Self {
            aliases: BTreeSet::new(),
            write_block: false,
            status: IndexStatus::Green,
            mappings,
            docs: BTreeMap::new(),
        }
    }

    fn descriptor(&self, name: &IndexName) -> IndexDescriptor {
        IndexDescriptor {
            name: name.clone(),
            aliases: self.aliases.clone(),
            write_block: self.write_block,
            mappings: self.mappings.clone(),
            doc_count: self.docs.len() as u64,
        }
    }
}

/// Documents visible through a PIT, in sort order.
#[derive(Debug)]
struct Snapshot {
    docs: Vec<MigratableDocument>,
}

#[derive(Debug)]
struct Task {
    remaining_polls: u32,
    failures: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    indices: BTreeMap<IndexName, MemIndex>,
    pits: HashMap<PitId, Snapshot>,
    tasks: HashMap<TaskId, Task>,
    faults: FaultPlan,
    calls: HashMap<Operation, u64>,
    task_polls: u32,
    unacked_write_blocks: u32,
}

/// A complete in-process [`DocumentStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    /// Creates an empty store without faults.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                indices: BTreeMap::new(),
                pits: HashMap::new(),
                tasks: HashMap::new(),
                faults: FaultPlan::new(),
                calls: HashMap::new(),
                task_polls: 1,
                unacked_write_blocks: 0,
            }),
            latency: None,
        }
    }

    /// Replaces the fault plan.
    pub fn with_fault_plan(self, plan: FaultPlan) -> Self {
        self.lock().faults = plan;
        self
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `get_task` polls before a reindex task reports completion.
    pub fn with_task_polls(self, polls: u32) -> Self {
        self.lock().task_polls = polls.max(1);
        self
    }

    // ------------------------------------------------------------------------
    // Seeding and inspection
    // ------------------------------------------------------------------------

    /// Creates an index directly, bypassing faults.
    pub fn insert_index(&self, name: impl Into<IndexName>, mappings: Mappings, aliases: &[&str]) {
        let mut index = MemIndex::new(mappings);
        index.aliases = aliases.iter().map(|a| (*a).to_string()).collect();
        self.lock().indices.insert(name.into(), index);
    }

    /// Stores documents directly, bypassing faults and write blocks.
    ///
    /// Creates the index with default mappings when missing.
    pub fn insert_documents(
        &self,
        name: impl Into<IndexName>,
        documents: impl IntoIterator<Item = MigratableDocument>,
    ) {
        let mut inner = self.lock();
        let index = inner
            .indices
            .entry(name.into())
            .or_insert_with(|| MemIndex::new(Mappings::default()));
        for doc in documents {
            index.docs.insert(doc.id.clone(), doc);
        }
    }

    pub fn set_index_status(&self, name: &IndexName, status: IndexStatus) {
        if let Some(index) = self.lock().indices.get_mut(name) {
            index.status = status;
        }
    }

    pub fn set_write_block(&self, name: &IndexName, blocked: bool) {
        if let Some(index) = self.lock().indices.get_mut(name) {
            index.write_block = blocked;
        }
    }

    /// Documents of `name` ordered by id; empty when the index is missing.
    pub fn documents(&self, name: &IndexName) -> Vec<MigratableDocument> {
        self.lock()
            .indices
            .get(name)
            .map(|index| index.docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn index(&self, name: &IndexName) -> Option<IndexDescriptor> {
        self.lock().indices.get(name).map(|index| index.descriptor(name))
    }

    pub fn index_names(&self) -> Vec<IndexName> {
        self.lock().indices.keys().cloned().collect()
    }

    /// Index names the alias currently points at.
    pub fn alias_targets(&self, alias: &str) -> Vec<IndexName> {
        self.lock()
            .indices
            .iter()
            .filter(|(_, index)| index.aliases.contains(alias))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of point-in-time snapshots still open.
    pub fn open_pit_count(&self) -> usize {
        self.lock().pits.len()
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: Operation) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn faults_injected(&self) -> u64 {
        self.lock().faults.injected()
    }

    // ------------------------------------------------------------------------
    // Fault control
    // ------------------------------------------------------------------------

    /// Fails the next call of `op` with `error`.
    pub fn inject(&self, op: Operation, error: StoreError) {
        self.lock().faults.push(op, error, 1);
    }

    /// Fails the next `times` calls of `op` with `error`.
    pub fn inject_times(&self, op: Operation, times: usize, error: StoreError) {
        self.lock().faults.push(op, error, times);
    }

    /// Fails every call of `op` with `error` until cleared.
    pub fn fail_always(&self, op: Operation, error: StoreError) {
        self.lock().faults.set_persistent(op, error);
    }

    pub fn clear_faults(&self, op: Operation) {
        self.lock().faults.clear(op);
    }

    /// The next `count` write blocks report `acknowledged: false`.
    pub fn unacknowledge_next_write_blocks(&self, count: u32) {
        self.lock().unacked_write_blocks = count;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Common prologue of every call: latency, accounting and faults.
    async fn enter(&self, op: Operation) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let fault = {
            let mut inner = self.lock();
            *inner.calls.entry(op).or_insert(0) += 1;
            inner.faults.next_fault(op)
        };
        match fault {
            Some(error) => {
                debug!(operation = %op, error = %error, "injecting store fault");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Operations
// ============================================================================

impl Inner {
    fn get(&self, name: &IndexName) -> StoreResult<&MemIndex> {
        self.indices
            .get(name)
            .ok_or_else(|| StoreError::index_not_found(name))
    }

    fn get_mut(&mut self, name: &IndexName) -> StoreResult<&mut MemIndex> {
        self.indices
            .get_mut(name)
            .ok_or_else(|| StoreError::index_not_found(name))
    }

    fn fetch_indices(&self, prefix: &str) -> Vec<IndexDescriptor> {
        self.indices
            .iter()
            .filter(|(name, index)| {
                name.as_str().starts_with(prefix) || index.aliases.iter().any(|a| a.starts_with(prefix))
            })
            .map(|(name, index)| index.descriptor(name))
            .collect()
    }

    fn wait_for_index_status(&self, name: &IndexName, status: IndexStatus) -> StoreResult<()> {
        let index = self.get(name)?;
        if index.status >= status {
            Ok(())
        } else {
            Err(StoreError::Timeout)
        }
    }

    fn create_index(
        &mut self,
        name: &IndexName,
        mappings: &Mappings,
        aliases: &[String],
    ) -> StoreResult<AckResponse> {
        if self.indices.contains_key(name) {
            return Err(StoreError::resource_already_exists(name));
        }
        let mut index = MemIndex::new(mappings.clone());
        index.aliases = aliases.iter().cloned().collect();
        self.indices.insert(name.clone(), index);
        Ok(AckResponse::ACKNOWLEDGED)
    }

    fn add_write_block(&mut self, name: &IndexName) -> StoreResult<AckResponse> {
        if self.unacked_write_blocks > 0 {
            self.get(name)?;
            self.unacked_write_blocks -= 1;
            return Ok(AckResponse {
                acknowledged: false,
                shards_acknowledged: false,
            });
        }
        let index = self.get_mut(name)?;
        let already_blocked = index.write_block;
        index.write_block = true;
        Ok(AckResponse {
            acknowledged: true,
            shards_acknowledged: !already_blocked,
        })
    }

    fn remove_write_block(&mut self, name: &IndexName) -> StoreResult<AckResponse> {
        self.get_mut(name)?.write_block = false;
        Ok(AckResponse::ACKNOWLEDGED)
    }

    fn clone_index(&mut self, source: &IndexName, target: &IndexName) -> StoreResult<AckResponse> {
        let src = self.get(source)?;
        if !src.write_block {
            return Err(StoreError::response(
                400,
                "illegal_state_exception",
                format!("index {source} must be read-only to resize index"),
            ));
        }
        if self.indices.contains_key(target) {
            return Err(StoreError::resource_already_exists(target));
        }
        let mut cloned = src.clone();
        cloned.aliases.clear();
        self.indices.insert(target.clone(), cloned);
        Ok(AckResponse::ACKNOWLEDGED)
    }

    fn reindex(&mut self, source: &IndexName, target: &IndexName) -> StoreResult<TaskId> {
        let docs: Vec<MigratableDocument> = self.get(source)?.docs.values().cloned().collect();
        let dest = self.get_mut(target)?;

        let mut failures = Vec::new();
        for doc in docs {
            if dest.write_block {
                failures.push(format!("{}: {}", doc.id, StoreError::write_block(target)));
                continue;
            }
            // conflicts=proceed: existing documents are left untouched
            dest.docs.entry(doc.id.clone()).or_insert(doc);
        }

        let task = TaskId::new(format!("node:{}", Uuid::new_v4()));
        self.tasks.insert(
            task.clone(),
            Task {
                remaining_polls: self.task_polls,
                failures,
            },
        );
        Ok(task)
    }

    fn get_task(&mut self, id: &TaskId) -> StoreResult<TaskStatus> {
        let task = self.tasks.get_mut(id).ok_or_else(|| {
            StoreError::response(404, "resource_not_found_exception", format!("task [{id}] isn't running"))
        })?;
        task.remaining_polls = task.remaining_polls.saturating_sub(1);
        Ok(TaskStatus {
            completed: task.remaining_polls == 0,
            failures: task.failures.clone(),
            error: None,
        })
    }

    fn open_point_in_time(&mut self, name: &IndexName) -> StoreResult<PitId> {
        let docs = self.get(name)?.docs.values().cloned().collect();
        let pit = PitId::new(Uuid::new_v4().to_string());
        self.pits.insert(pit.clone(), Snapshot { docs });
        Ok(pit)
    }

    fn search_after(
        &self,
        pit: &PitId,
        after: Option<SortKey>,
        size: usize,
    ) -> StoreResult<SearchPage> {
        let snapshot = self.pits.get(pit).ok_or_else(|| {
            StoreError::response(
                404,
                "search_context_missing_exception",
                format!("no search context found for id [{pit}]"),
            )
        })?;

        // Sort keys are 1-based snapshot positions.
        let skip = after.map_or(0, |key| key.as_u64() as usize);
        let hits = snapshot
            .docs
            .iter()
            .enumerate()
            .skip(skip)
            .take(size)
            .map(|(position, doc)| Hit {
                document: doc.clone(),
                sort: SortKey::new(position as u64 + 1),
            })
            .collect();

        Ok(SearchPage {
            hits,
            total: snapshot.docs.len() as u64,
            pit_id: pit.clone(),
        })
    }

    fn bulk_index(&mut self, name: &IndexName, documents: &[MigratableDocument]) -> BulkResponse {
        let items = documents
            .iter()
            .map(|doc| {
                let result = match self.indices.get_mut(name) {
                    None => Err(StoreError::index_not_found(name)),
                    Some(index) if index.write_block => Err(StoreError::write_block(name)),
                    Some(index) if index.docs.contains_key(&doc.id) => {
                        Err(StoreError::version_conflict(&doc.id))
                    }
                    Some(index) => {
                        index.docs.insert(doc.id.clone(), doc.clone());
                        Ok(())
                    }
                };
                BulkItem {
                    id: doc.id.clone(),
                    result,
                }
            })
            .collect();
        BulkResponse { items }
    }

    fn update_aliases(&mut self, actions: &[AliasAction]) -> StoreResult<AckResponse> {
        // Validate everything first so the update is all-or-nothing.
        for action in actions {
            match action {
                AliasAction::Add { index, .. } | AliasAction::RemoveIndex { index } => {
                    self.get(index)?;
                }
                AliasAction::Remove {
                    index,
                    alias,
                    must_exist,
                } => {
                    let target = self.get(index)?;
                    if *must_exist && !target.aliases.contains(alias) {
                        return Err(StoreError::aliases_not_found(alias));
                    }
                }
            }
        }

        for action in actions {
            match action {
                AliasAction::Add { index, alias, .. } => {
                    if let Some(target) = self.indices.get_mut(index) {
                        target.aliases.insert(alias.clone());
                    }
                }
                AliasAction::Remove { index, alias, .. } => {
                    if let Some(target) = self.indices.get_mut(index) {
                        target.aliases.remove(alias);
                    }
                }
                AliasAction::RemoveIndex { index } => {
                    self.indices.remove(index);
                }
            }
        }
        Ok(AckResponse::ACKNOWLEDGED)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn fetch_indices(&self, prefix: &str) -> StoreResult<Vec<IndexDescriptor>> {
        self.enter(Operation::FetchIndices).await?;
        Ok(self.lock().fetch_indices(prefix))
    }

    async fn wait_for_index_status(
        &self,
        index: &IndexName,
        status: IndexStatus,
        _timeout: Duration,
    ) -> StoreResult<()> {
        self.enter(Operation::WaitForIndexStatus).await?;
        self.lock().wait_for_index_status(index, status)
    }

    async fn create_index(
        &self,
        index: &IndexName,
        mappings: &Mappings,
        aliases: &[String],
    ) -> StoreResult<AckResponse> {
        self.enter(Operation::CreateIndex).await?;
        self.lock().create_index(index, mappings, aliases)
    }

    async fn add_write_block(
        &self,
        index: &IndexName,
        _timeout: Duration,
    ) -> StoreResult<AckResponse> {
        self.enter(Operation::AddWriteBlock).await?;
        self.lock().add_write_block(index)
    }

    async fn remove_write_block(&self, index: &IndexName) -> StoreResult<AckResponse> {
        self.enter(Operation::RemoveWriteBlock).await?;
        self.lock().remove_write_block(index)
    }

    async fn clone_index(
        &self,
        source: &IndexName,
        target: &IndexName,
        _timeout: Duration,
    ) -> StoreResult<AckResponse> {
        self.enter(Operation::CloneIndex).await?;
        self.lock().clone_index(source, target)
    }

    async fn reindex(&self, source: &IndexName, target: &IndexName) -> StoreResult<TaskId> {
        self.enter(Operation::Reindex).await?;
        self.lock().reindex(source, target)
    }

    async fn get_task(&self, task: &TaskId, _timeout: Duration) -> StoreResult<TaskStatus> {
        self.enter(Operation::GetTask).await?;
        self.lock().get_task(task)
    }

    async fn open_point_in_time(&self, index: &IndexName, _keep_alive: &str) -> StoreResult<PitId> {
        self.enter(Operation::OpenPointInTime).await?;
        self.lock().open_point_in_time(index)
    }

    async fn close_point_in_time(&self, pit: &PitId) -> StoreResult<()> {
        self.enter(Operation::ClosePointInTime).await?;
        self.lock().pits.remove(pit);
        Ok(())
    }

    async fn search_after(
        &self,
        pit: &PitId,
        search_after: Option<SortKey>,
        size: usize,
        _keep_alive: &str,
    ) -> StoreResult<SearchPage> {
        self.enter(Operation::SearchAfter).await?;
        self.lock().search_after(pit, search_after, size)
    }

    async fn bulk_index(
        &self,
        index: &IndexName,
        documents: &[MigratableDocument],
        _refresh: Refresh,
    ) -> StoreResult<BulkResponse> {
        self.enter(Operation::BulkIndex).await?;
        Ok(self.lock().bulk_index(index, documents))
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> StoreResult<AckResponse> {
        self.enter(Operation::UpdateAliases).await?;
        self.lock().update_aliases(actions)
    }

    async fn refresh(&self, index: &IndexName) -> StoreResult<()> {
        self.enter(Operation::Refresh).await?;
        self.lock().get(index).map(|_| ())
    }
}
