//! Final outcome of a coordinated migration.

use std::time::Duration;

use serde::Serialize;
use somig_kernel::{ControlState, FatalReason, LogEntry, State};
use somig_types::{DocumentTransformError, IndexName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Done,
    Fatal,
}

/// Outcome of one index prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub prefix: String,
    pub target_index: IndexName,
    pub control: ControlState,
    pub fatal: Option<FatalReason>,
    pub total_retries: u32,
    pub docs_processed: u64,
    pub docs_written: u64,
    pub docs_total: u64,
    pub transform_errors: usize,
    pub transform_error_sample: Vec<DocumentTransformError>,
    /// A point-in-time was left open because closing it failed.
    pub pit_leaked: bool,
    pub elapsed_ms: u64,
    pub logs: Vec<LogEntry>,
}

impl IndexReport {
    pub fn from_state(state: State, pit_leaked: bool, elapsed: Duration) -> Self {
        Self {
            target_index: state.target_index,
            control: state.control,
            fatal: state.fatal,
            total_retries: state.total_retries,
            docs_processed: state.docs_processed,
            docs_written: state.docs_written,
            docs_total: state.docs_total,
            transform_errors: state.transform_errors,
            transform_error_sample: state.transform_error_sample,
            pit_leaked,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            logs: state.logs,
            prefix: state.prefix,
        }
    }

    pub fn is_done(&self) -> bool {
        self.control == ControlState::Done
    }
}

/// Outcome of every planned prefix, in plan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub status: MigrationStatus,
    pub indices: Vec<IndexReport>,
}

impl MigrationReport {
    pub fn new(indices: Vec<IndexReport>) -> Self {
        let status = if indices.iter().all(IndexReport::is_done) {
            MigrationStatus::Done
        } else {
            MigrationStatus::Fatal
        };
        Self { status, indices }
    }

    /// The first failure in plan order.
    pub fn fatal(&self) -> Option<(&str, &FatalReason)> {
        self.indices
            .iter()
            .find_map(|r| r.fatal.as_ref().map(|f| (r.prefix.as_str(), f)))
    }

    pub fn index(&self, prefix: &str) -> Option<&IndexReport> {
        self.indices.iter().find(|r| r.prefix == prefix)
    }

    pub fn docs_written(&self) -> u64 {
        self.indices.iter().map(|r| r.docs_written).sum()
    }
}
