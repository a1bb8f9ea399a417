//! Live progress published while migrations run.

use std::collections::BTreeMap;

use serde::Serialize;
use somig_kernel::{ControlState, State};

/// Progress of one index prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexProgress {
    pub control: ControlState,
    pub retry_count: u32,
    pub total_retries: u32,
    pub docs_processed: u64,
    pub docs_written: u64,
    pub docs_total: u64,
    pub transform_errors: usize,
}

impl IndexProgress {
    pub fn of(state: &State) -> Self {
        Self {
            control: state.control,
            retry_count: state.retry_count,
            total_retries: state.total_retries,
            docs_processed: state.docs_processed,
            docs_written: state.docs_written,
            docs_total: state.docs_total,
            transform_errors: state.transform_errors,
        }
    }
}

/// Progress of every planned prefix, keyed by prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub indices: BTreeMap<String, IndexProgress>,
}

impl ProgressSnapshot {
    /// Number of prefixes that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.indices
            .values()
            .filter(|p| p.control.is_terminal())
            .count()
    }

    pub fn is_finished(&self) -> bool {
        self.finished() == self.indices.len()
    }
}
