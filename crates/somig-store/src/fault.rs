//! Fault injection for the in-memory store.
//!
//! A [`FaultPlan`] decides, before every store call, whether the call fails
//! instead of touching the data. Three sources are consulted in order:
//!
//! 1. scripted errors queued for the operation (consumed one per call)
//! 2. a persistent error for the operation
//! 3. a seeded probability applied to every operation
//!
//! Probabilistic faults are always retryable so a seeded run still converges
//! when the retry budget is large enough.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::{self, Display};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::StoreError;

/// Store operations that can be targeted by faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    FetchIndices,
    WaitForIndexStatus,
    CreateIndex,
    AddWriteBlock,
    RemoveWriteBlock,
    CloneIndex,
    Reindex,
    GetTask,
    OpenPointInTime,
    ClosePointInTime,
    SearchAfter,
    BulkIndex,
    UpdateAliases,
    Refresh,
}

impl Operation {
    pub const ALL: [Operation; 14] = [
        Operation::FetchIndices,
        Operation::WaitForIndexStatus,
        Operation::CreateIndex,
        Operation::AddWriteBlock,
        Operation::RemoveWriteBlock,
        Operation::CloneIndex,
        Operation::Reindex,
        Operation::GetTask,
        Operation::OpenPointInTime,
        Operation::ClosePointInTime,
        Operation::SearchAfter,
        Operation::BulkIndex,
        Operation::UpdateAliases,
        Operation::Refresh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::FetchIndices => "fetch_indices",
            Operation::WaitForIndexStatus => "wait_for_index_status",
            Operation::CreateIndex => "create_index",
            Operation::AddWriteBlock => "add_write_block",
            Operation::RemoveWriteBlock => "remove_write_block",
            Operation::CloneIndex => "clone_index",
            Operation::Reindex => "reindex",
            Operation::GetTask => "get_task",
            Operation::OpenPointInTime => "open_point_in_time",
            Operation::ClosePointInTime => "close_point_in_time",
            Operation::SearchAfter => "search_after",
            Operation::BulkIndex => "bulk_index",
            Operation::UpdateAliases => "update_aliases",
            Operation::Refresh => "refresh",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scripted and probabilistic failures for an [`InMemoryStore`](crate::InMemoryStore).
#[derive(Debug)]
pub struct FaultPlan {
    scripted: HashMap<Operation, VecDeque<StoreError>>,
    persistent: HashMap<Operation, StoreError>,
    /// Probability (0.0 to 1.0) that any call fails with a transient error.
    failure_probability: f64,
    /// Operations exempt from probabilistic faults.
    exempt: BTreeSet<Operation>,
    rng: SmallRng,
    injected: u64,
}

impl FaultPlan {
    /// A plan that never fails.
    pub fn new() -> Self {
        Self {
            scripted: HashMap::new(),
            persistent: HashMap::new(),
            failure_probability: 0.0,
            exempt: BTreeSet::new(),
            rng: SmallRng::seed_from_u64(0),
            injected: 0,
        }
    }

    /// Fails every operation with `probability`, driven by `seed`.
    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            failure_probability: probability.clamp(0.0, 1.0),
            rng: SmallRng::seed_from_u64(seed),
            ..Self::new()
        }
    }

    /// Excludes `op` from probabilistic faults.
    pub fn exempt(mut self, op: Operation) -> Self {
        self.exempt.insert(op);
        self
    }

    /// Queues `error` for the next call of `op`.
    pub fn fail_next(mut self, op: Operation, error: StoreError) -> Self {
        self.push(op, error, 1);
        self
    }

    /// Queues `error` for the next `times` calls of `op`.
    pub fn fail_times(mut self, op: Operation, times: usize, error: StoreError) -> Self {
        self.push(op, error, times);
        self
    }

    /// Fails every call of `op` with `error` until cleared.
    pub fn fail_always(mut self, op: Operation, error: StoreError) -> Self {
        self.persistent.insert(op, error);
        self
    }

    pub(crate) fn push(&mut self, op: Operation, error: StoreError, times: usize) {
        let queue = self.scripted.entry(op).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    pub(crate) fn set_persistent(&mut self, op: Operation, error: StoreError) {
        self.persistent.insert(op, error);
    }

    pub(crate) fn clear(&mut self, op: Operation) {
        self.scripted.remove(&op);
        self.persistent.remove(&op);
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> u64 {
        self.injected
    }

    /// Decides whether the current call of `op` fails.
    pub(crate) fn next_fault(&mut self, op: Operation) -> Option<StoreError> {
        let fault = self
            .scripted
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.persistent.get(&op).cloned())
            .or_else(|| self.roll(op));

        if fault.is_some() {
            self.injected += 1;
        }
        fault
    }

    fn roll(&mut self, op: Operation) -> Option<StoreError> {
        if self.failure_probability <= 0.0 || self.exempt.contains(&op) {
            return None;
        }
        if !self.rng.gen_bool(self.failure_probability) {
            return None;
        }
        let error = match self.rng.gen_range(0..3) {
            0 => StoreError::Timeout,
            1 => StoreError::Connection("connection reset by peer".to_string()),
            _ => StoreError::unavailable(),
        };
        Some(error)
    }
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_faults_are_consumed_in_order() {
        let mut plan = FaultPlan::new()
            .fail_next(Operation::OpenPointInTime, StoreError::Timeout)
            .fail_next(Operation::OpenPointInTime, StoreError::unavailable());

        assert_eq!(plan.next_fault(Operation::OpenPointInTime), Some(StoreError::Timeout));
        assert_eq!(
            plan.next_fault(Operation::OpenPointInTime),
            Some(StoreError::unavailable())
        );
        assert_eq!(plan.next_fault(Operation::OpenPointInTime), None);
        assert_eq!(plan.injected(), 2);
    }

    #[test]
    fn faults_only_hit_their_operation() {
        let mut plan = FaultPlan::new().fail_times(Operation::BulkIndex, 3, StoreError::Timeout);

        assert_eq!(plan.next_fault(Operation::SearchAfter), None);
        assert_eq!(plan.next_fault(Operation::BulkIndex), Some(StoreError::Timeout));
    }

    #[test]
    fn persistent_fault_survives_calls_until_cleared() {
        let mut plan = FaultPlan::new().fail_always(Operation::Refresh, StoreError::unavailable());

        for _ in 0..5 {
            assert!(plan.next_fault(Operation::Refresh).is_some());
        }
        plan.clear(Operation::Refresh);
        assert_eq!(plan.next_fault(Operation::Refresh), None);
    }

    #[test]
    fn seeded_plans_are_reproducible() {
        let mut a = FaultPlan::seeded(0.5, 42);
        let mut b = FaultPlan::seeded(0.5, 42);

        for op in Operation::ALL.iter().cycle().take(200) {
            assert_eq!(a.next_fault(*op), b.next_fault(*op));
        }
    }

    #[test]
    fn probabilistic_faults_are_transient() {
        let mut plan = FaultPlan::seeded(1.0, 7).exempt(Operation::ClosePointInTime);

        for _ in 0..50 {
            let fault = plan.next_fault(Operation::SearchAfter);
            assert!(matches!(
                fault,
                Some(StoreError::Timeout | StoreError::Connection(_) | StoreError::Response { status: 503, .. })
            ));
        }
        assert_eq!(plan.next_fault(Operation::ClosePointInTime), None);
    }
}
