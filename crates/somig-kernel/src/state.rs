//! Migration state.
//!
//! One [`State`] describes the migration of one index prefix. Transitions
//! take ownership of the state and return the next one; nothing here
//! performs IO.

use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use somig_types::{
    ActionError, DocumentTransformError, IndexName, Mappings, MigratableDocument, PitId,
    RetryPolicy, SchemaVersion, SortKey, TaskId,
};

/// Maximum number of transform errors kept as a sample for the report.
pub const TRANSFORM_ERROR_SAMPLE_SIZE: usize = 10;

/// Maximum number of log entries kept per migration; the oldest are dropped.
pub const MAX_LOG_ENTRIES: usize = 200;

// ============================================================================
// Control States
// ============================================================================

/// The step a migration is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlState {
    Init,
    CreateNewTarget,
    LegacySetWriteBlock,
    LegacyCreateReindexTarget,
    LegacyReindex,
    LegacyReindexWaitForTask,
    LegacyDelete,
    WaitForYellowSource,
    SetSourceWriteBlock,
    CreateTempIndex,
    OpenPit,
    ReadBatch,
    TransformBatch,
    WriteBatch,
    ClosePit,
    SetTempWriteBlock,
    CloneTempToTarget,
    RemoveTargetWriteBlock,
    RefreshTarget,
    UpdateAliases,
    Done,
    Fatal,
}

impl ControlState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ControlState::Done | ControlState::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlState::Init => "INIT",
            ControlState::CreateNewTarget => "CREATE_NEW_TARGET",
            ControlState::LegacySetWriteBlock => "LEGACY_SET_WRITE_BLOCK",
            ControlState::LegacyCreateReindexTarget => "LEGACY_CREATE_REINDEX_TARGET",
            ControlState::LegacyReindex => "LEGACY_REINDEX",
            ControlState::LegacyReindexWaitForTask => "LEGACY_REINDEX_WAIT_FOR_TASK",
            ControlState::LegacyDelete => "LEGACY_DELETE",
            ControlState::WaitForYellowSource => "WAIT_FOR_YELLOW_SOURCE",
            ControlState::SetSourceWriteBlock => "SET_SOURCE_WRITE_BLOCK",
            ControlState::CreateTempIndex => "CREATE_REINDEX_TEMP",
            ControlState::OpenPit => "REINDEX_SOURCE_TO_TEMP_OPEN_PIT",
            ControlState::ReadBatch => "REINDEX_SOURCE_TO_TEMP_READ",
            ControlState::TransformBatch => "REINDEX_SOURCE_TO_TEMP_TRANSFORM",
            ControlState::WriteBatch => "REINDEX_SOURCE_TO_TEMP_INDEX_BULK",
            ControlState::ClosePit => "REINDEX_SOURCE_TO_TEMP_CLOSE_PIT",
            ControlState::SetTempWriteBlock => "SET_TEMP_WRITE_BLOCK",
            ControlState::CloneTempToTarget => "CLONE_TEMP_TO_TARGET",
            ControlState::RemoveTargetWriteBlock => "REMOVE_TARGET_WRITE_BLOCK",
            ControlState::RefreshTarget => "REFRESH_TARGET",
            ControlState::UpdateAliases => "MARK_VERSION_INDEX_READY",
            ControlState::Done => "DONE",
            ControlState::Fatal => "FATAL",
        }
    }
}

impl Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Tunables of one migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Documents read per PIT page.
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// The run fails once more than this many documents failed to transform.
    pub transform_error_threshold: usize,
    /// Keep-alive lease of the point-in-time, in store duration syntax.
    pub pit_keep_alive: String,
    /// Bound on a single store call.
    pub action_timeout: Duration,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            retry: RetryPolicy::default(),
            transform_error_threshold: 100,
            pit_keep_alive: "10m".to_string(),
            action_timeout: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Log and Fatal Reasons
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// A notable event recorded for the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub control: ControlState,
    pub message: String,
}

/// Why a migration ended in [`ControlState::Fatal`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FatalReason {
    #[error("unable to complete {state} after {attempts} attempts, last error: {last_error}")]
    RetryCeilingExceeded {
        state: ControlState,
        attempts: u32,
        last_error: String,
    },

    #[error("index {index} not found in {state}")]
    IndexNotFound {
        state: ControlState,
        index: IndexName,
    },

    #[error("mapping conflict on {index}: {reason}")]
    MappingConflict { index: IndexName, reason: String },

    #[error("{count} documents failed to transform (threshold {threshold})")]
    TransformErrorThreshold {
        count: usize,
        threshold: usize,
        sample: Vec<DocumentTransformError>,
    },

    #[error("bulk write into {index} failed: {message}")]
    BulkWriteFailed { index: IndexName, message: String },

    /// The alias points at an index of a newer version.
    #[error("index {index} belongs to a later version {version}")]
    IndexBelongsToLaterVersion {
        index: IndexName,
        version: SchemaVersion,
    },

    #[error("unexpected error in {state}: {message}")]
    Unexpected {
        state: ControlState,
        message: String,
    },

    #[error("migration cancelled: {reason}")]
    Cancelled { reason: String },
}

impl FatalReason {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FatalReason::RetryCeilingExceeded { .. } => "retry_ceiling_exceeded",
            FatalReason::IndexNotFound { .. } => "index_not_found",
            FatalReason::MappingConflict { .. } => "mapping_conflict",
            FatalReason::TransformErrorThreshold { .. } => "transform_error_threshold",
            FatalReason::BulkWriteFailed { .. } => "bulk_write_failed",
            FatalReason::IndexBelongsToLaterVersion { .. } => "index_belongs_to_later_version",
            FatalReason::Unexpected { .. } => "unexpected",
            FatalReason::Cancelled { .. } => "cancelled",
        }
    }
}

// ============================================================================
// Migration State
// ============================================================================

/// Complete state of one index migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub control: ControlState,

    // Layout
    /// Index prefix, also the name of the alias readers use.
    pub prefix: String,
    pub target_version: SchemaVersion,
    /// Mappings of the temporary and target indices.
    pub mappings: Mappings,
    pub target_index: IndexName,
    pub temp_index: IndexName,
    pub version_alias: IndexName,
    /// Index the documents are read from.
    pub source_index: Option<IndexName>,
    /// Concrete index named after the prefix, from before aliases existed.
    pub legacy_index: Option<IndexName>,
    pub legacy_mappings: Option<Mappings>,
    pub reindex_task: Option<TaskId>,

    // Document movement
    /// Open point-in-time; kept until closed so it can be released on failure.
    pub pit: Option<PitId>,
    pub search_after: Option<SortKey>,
    /// Documents read but not yet written.
    pub pending: Vec<MigratableDocument>,
    pub docs_processed: u64,
    pub docs_written: u64,
    pub docs_total: u64,
    pub transform_errors: usize,
    pub transform_error_sample: Vec<DocumentTransformError>,

    // Retries
    /// Consecutive failures of the current action.
    pub retry_count: u32,
    /// All retries of the run.
    pub total_retries: u32,
    /// Delay the runner waits before issuing the next action.
    pub retry_delay: Duration,
    pub last_error: Option<ActionError>,

    pub fatal: Option<FatalReason>,
    pub logs: Vec<LogEntry>,
    pub settings: MigrationSettings,
}

impl State {
    /// Creates the initial state of a migration of `prefix` to `target_version`.
    pub fn new(
        prefix: impl Into<String>,
        target_version: SchemaVersion,
        mappings: Mappings,
        settings: MigrationSettings,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            control: ControlState::Init,
            target_index: IndexName::target(&prefix, target_version),
            temp_index: IndexName::temp(&prefix, target_version),
            version_alias: IndexName::version_alias(&prefix, target_version),
            prefix,
            target_version,
            mappings,
            source_index: None,
            legacy_index: None,
            legacy_mappings: None,
            reindex_task: None,
            pit: None,
            search_after: None,
            pending: Vec::new(),
            docs_processed: 0,
            docs_written: 0,
            docs_total: 0,
            transform_errors: 0,
            transform_error_sample: Vec::new(),
            retry_count: 0,
            total_retries: 0,
            retry_delay: Duration::ZERO,
            last_error: None,
            fatal: None,
            logs: Vec::new(),
            settings,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.control.is_terminal()
    }

    /// Index the legacy index is reindexed into.
    pub fn pre_migration_index(&self) -> IndexName {
        IndexName::pre_migration(&self.prefix, self.target_version)
    }

    /// Moves to `control`.
    pub fn with_control(mut self, control: ControlState) -> Self {
        self.control = control;
        self
    }

    /// Moves to [`ControlState::Fatal`] with `reason`.
    ///
    /// The PIT handle is kept so the runner can release it.
    pub fn into_fatal(mut self, reason: FatalReason) -> Self {
        let from = self.control;
        self.log(LogLevel::Error, format!("{from}: {reason}"));
        self.control = ControlState::Fatal;
        self.fatal = Some(reason);
        self.retry_delay = Duration::ZERO;
        self
    }

    /// Appends to the bounded log.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.remove(0);
        }
        self.logs.push(LogEntry {
            level,
            control: self.control,
            message: message.into(),
        });
    }
}
