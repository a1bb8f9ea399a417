//! The migration state machine.
//!
//! [`apply`] folds the outcome of the last action into the state and
//! returns the next action. It is completely pure: no IO, no clocks, no
//! randomness. The same state and outcome always produce the same result.
//!
//! # Example
//!
//! ```ignore
//! let mut state = State::new(".kibana", version, mappings, settings);
//! let mut next = next_action(&state);
//!
//! while let Some(action) = next {
//!     sleep(state.retry_delay).await;
//!     let outcome = execute(&action).await;
//!     (state, next) = apply(state, outcome);
//! }
//! ```

use std::time::Duration;

use somig_types::{
    ActionError, ActionResponse, ActionResult, AliasAction, IndexDescriptor, IndexStatus,
    SchemaVersion,
};

use crate::action::Action;
use crate::state::{
    ControlState, FatalReason, LogLevel, State, TRANSFORM_ERROR_SAMPLE_SIZE,
};

/// Applies the outcome of the last action to `state`.
///
/// Returns the new state and the next action, which is `None` exactly when
/// the new state is terminal.
pub fn apply(state: State, outcome: ActionResult) -> (State, Option<Action>) {
    if state.is_terminal() {
        return (state, None);
    }

    let state = match outcome {
        Ok(response) => on_success(state.reset_retries(), response),
        Err(error) => on_error(state, error),
    };

    finish(state)
}

/// Moves a running migration to [`ControlState::Fatal`] because it was
/// cancelled.
pub fn cancel(state: State, reason: impl Into<String>) -> State {
    if state.is_terminal() {
        return state;
    }
    state.into_fatal(FatalReason::Cancelled {
        reason: reason.into(),
    })
}

/// Returns the action the state calls for, or `None` when terminal or when
/// the state is missing data it needs.
pub fn next_action(state: &State) -> Option<Action> {
    let action = match state.control {
        ControlState::Init => Action::FetchIndices {
            prefix: state.prefix.clone(),
        },
        ControlState::CreateNewTarget => Action::CreateIndex {
            index: state.target_index.clone(),
            mappings: state.mappings.clone(),
            aliases: vec![state.version_alias.to_string()],
        },
        ControlState::LegacySetWriteBlock => Action::SetWriteBlock {
            index: state.legacy_index.clone()?,
        },
        ControlState::LegacyCreateReindexTarget => Action::CreateIndex {
            index: state.pre_migration_index(),
            mappings: state.legacy_mappings.clone().unwrap_or_default(),
            aliases: Vec::new(),
        },
        ControlState::LegacyReindex => Action::Reindex {
            source: state.legacy_index.clone()?,
            target: state.pre_migration_index(),
        },
        ControlState::LegacyReindexWaitForTask => Action::WaitForTask {
            task: state.reindex_task.clone()?,
        },
        ControlState::LegacyDelete => Action::UpdateAliases {
            actions: vec![
                AliasAction::RemoveIndex {
                    index: state.legacy_index.clone()?,
                },
                AliasAction::Add {
                    index: state.pre_migration_index(),
                    alias: state.prefix.clone(),
                    must_exist: false,
                },
            ],
        },
        ControlState::WaitForYellowSource => Action::WaitForIndexStatus {
            index: state.source_index.clone()?,
            status: IndexStatus::Yellow,
        },
        ControlState::SetSourceWriteBlock => Action::SetWriteBlock {
            index: state.source_index.clone()?,
        },
        ControlState::CreateTempIndex => Action::CreateIndex {
            index: state.temp_index.clone(),
            mappings: state.mappings.clone(),
            aliases: Vec::new(),
        },
        ControlState::OpenPit => Action::OpenPit {
            index: state.source_index.clone()?,
        },
        ControlState::ReadBatch => Action::ReadBatch {
            pit: state.pit.clone()?,
            search_after: state.search_after,
            batch_size: state.settings.batch_size,
        },
        ControlState::TransformBatch => Action::TransformBatch {
            documents: state.pending.clone(),
        },
        ControlState::WriteBatch => Action::BulkWrite {
            index: state.temp_index.clone(),
            documents: state.pending.clone(),
        },
        ControlState::ClosePit => Action::ClosePit {
            pit: state.pit.clone()?,
        },
        ControlState::SetTempWriteBlock => Action::SetWriteBlock {
            index: state.temp_index.clone(),
        },
        ControlState::CloneTempToTarget => Action::CloneIndex {
            source: state.temp_index.clone(),
            target: state.target_index.clone(),
        },
        ControlState::RemoveTargetWriteBlock => Action::RemoveWriteBlock {
            index: state.target_index.clone(),
        },
        ControlState::RefreshTarget => Action::RefreshIndex {
            index: state.target_index.clone(),
        },
        ControlState::UpdateAliases => Action::UpdateAliases {
            actions: alias_swap(state),
        },
        ControlState::Done | ControlState::Fatal => return None,
    };
    Some(action)
}

/// Alias changes that make the target the current version.
fn alias_swap(state: &State) -> Vec<AliasAction> {
    let mut actions = Vec::with_capacity(4);
    if let Some(source) = &state.source_index {
        actions.push(AliasAction::Remove {
            index: source.clone(),
            alias: state.prefix.clone(),
            must_exist: true,
        });
    }
    actions.push(AliasAction::Add {
        index: state.target_index.clone(),
        alias: state.prefix.clone(),
        must_exist: false,
    });
    actions.push(AliasAction::Add {
        index: state.target_index.clone(),
        alias: state.version_alias.to_string(),
        must_exist: false,
    });
    if state.source_index.is_some() {
        actions.push(AliasAction::RemoveIndex {
            index: state.temp_index.clone(),
        });
    }
    actions
}

/// Derives the next action, turning a non-terminal state without one into
/// a fatal state.
fn finish(state: State) -> (State, Option<Action>) {
    if state.is_terminal() {
        return (state, None);
    }
    match next_action(&state) {
        Some(action) => (state, Some(action)),
        None => {
            let control = state.control;
            let fatal = state.into_fatal(FatalReason::Unexpected {
                state: control,
                message: "state is missing the data its action needs".to_string(),
            });
            (fatal, None)
        }
    }
}

// ============================================================================
// Success Transitions
// ============================================================================

#[allow(clippy::too_many_lines)]
fn on_success(mut state: State, response: ActionResponse) -> State {
    use ControlState as C;

    match (state.control, response) {
        (C::Init, ActionResponse::Indices(indices)) => init(state, &indices),

        (C::CreateNewTarget, ActionResponse::IndexCreated) => state.with_control(C::UpdateAliases),

        (C::LegacySetWriteBlock, ActionResponse::WriteBlockSet) => {
            state.with_control(C::LegacyCreateReindexTarget)
        }
        (C::LegacyCreateReindexTarget, ActionResponse::IndexCreated) => {
            state.with_control(C::LegacyReindex)
        }
        (C::LegacyReindex, ActionResponse::ReindexStarted(task)) => {
            state.reindex_task = Some(task);
            state.with_control(C::LegacyReindexWaitForTask)
        }
        (C::LegacyReindexWaitForTask, ActionResponse::TaskCompleted) => {
            state.reindex_task = None;
            state.with_control(C::LegacyDelete)
        }
        (C::LegacyDelete, ActionResponse::AliasesUpdated) => {
            let source = state.pre_migration_index();
            state.log(
                LogLevel::Info,
                format!("legacy index replaced by {source}, migrating from it"),
            );
            state.source_index = Some(source);
            state.with_control(C::WaitForYellowSource)
        }

        (C::WaitForYellowSource, ActionResponse::IndexReady) => {
            state.with_control(C::SetSourceWriteBlock)
        }
        (C::SetSourceWriteBlock, ActionResponse::WriteBlockSet) => {
            state.with_control(C::CreateTempIndex)
        }
        (C::CreateTempIndex, ActionResponse::IndexCreated) => state.with_control(C::OpenPit),

        (C::OpenPit, ActionResponse::PitOpened(pit)) => {
            state.pit = Some(pit);
            state.search_after = None;
            state.with_control(C::ReadBatch)
        }

        (C::ReadBatch, ActionResponse::BatchRead(batch)) => {
            state.pit = Some(batch.pit);
            state.docs_total = batch.total;
            if batch.documents.is_empty() {
                state.pending.clear();
                return state.with_control(C::ClosePit);
            }
            state.search_after = batch.last_sort;
            state.docs_processed += batch.documents.len() as u64;
            state.pending = batch.documents;
            state.with_control(C::TransformBatch)
        }

        (C::TransformBatch, ActionResponse::BatchTransformed(batch)) => {
            if !batch.errors.is_empty() {
                state.transform_errors += batch.errors.len();
                let room = TRANSFORM_ERROR_SAMPLE_SIZE.saturating_sub(state.transform_error_sample.len());
                state
                    .transform_error_sample
                    .extend(batch.errors.iter().take(room).cloned());
                state.log(
                    LogLevel::Warning,
                    format!(
                        "{} documents failed to transform, {} so far",
                        batch.errors.len(),
                        state.transform_errors
                    ),
                );
            }

            let threshold = state.settings.transform_error_threshold;
            if state.transform_errors > threshold {
                let reason = FatalReason::TransformErrorThreshold {
                    count: state.transform_errors,
                    threshold,
                    sample: state.transform_error_sample.clone(),
                };
                state.pending.clear();
                return state.into_fatal(reason);
            }

            if batch.documents.is_empty() {
                state.pending.clear();
                state.with_control(C::ReadBatch)
            } else {
                state.pending = batch.documents;
                state.with_control(C::WriteBatch)
            }
        }

        (C::WriteBatch, ActionResponse::BatchWritten { count }) => {
            state.docs_written += count as u64;
            state.pending.clear();
            state.with_control(C::ReadBatch)
        }

        (C::ClosePit, ActionResponse::PitClosed) => {
            state.pit = None;
            state.search_after = None;
            state.with_control(C::SetTempWriteBlock)
        }
        (C::SetTempWriteBlock, ActionResponse::WriteBlockSet) => {
            state.with_control(C::CloneTempToTarget)
        }
        (C::CloneTempToTarget, ActionResponse::IndexCloned) => {
            state.with_control(C::RemoveTargetWriteBlock)
        }
        (C::RemoveTargetWriteBlock, ActionResponse::WriteBlockRemoved) => {
            state.with_control(C::RefreshTarget)
        }
        (C::RefreshTarget, ActionResponse::Refreshed) => state.with_control(C::UpdateAliases),
        (C::UpdateAliases, ActionResponse::AliasesUpdated) => {
            let message = format!("{} now points at {}", state.prefix, state.target_index);
            state.log(LogLevel::Info, message);
            state.with_control(C::Done)
        }

        (control, response) => {
            let message = format!("unexpected response {} in {control}", response.name());
            state.into_fatal(FatalReason::Unexpected {
                state: control,
                message,
            })
        }
    }
}

/// Decides the migration path from the indices found under the prefix.
fn init(mut state: State, indices: &[IndexDescriptor]) -> State {
    let prefix = state.prefix.clone();
    let current = indices.iter().find(|index| index.has_alias(&prefix));

    if let Some(current) = current {
        if current.name == state.target_index || current.has_alias(state.version_alias.as_str()) {
            state.log(
                LogLevel::Info,
                format!("{prefix} already points at {}", current.name),
            );
            return state.with_control(ControlState::Done);
        }

        if let Some(version) = newest_version(&prefix, current)
            && version > state.target_version
        {
            return state.into_fatal(FatalReason::IndexBelongsToLaterVersion {
                index: current.name.clone(),
                version,
            });
        }

        state.source_index = Some(current.name.clone());
        return state.with_control(ControlState::WaitForYellowSource);
    }

    if let Some(legacy) = indices.iter().find(|index| index.name.as_str() == prefix) {
        state.log(
            LogLevel::Info,
            format!("found legacy index {}, reindexing it first", legacy.name),
        );
        state.legacy_index = Some(legacy.name.clone());
        state.legacy_mappings = Some(legacy.mappings.clone());
        return state.with_control(ControlState::LegacySetWriteBlock);
    }

    state.with_control(ControlState::CreateNewTarget)
}

/// Newest version encoded in the index name or its version aliases.
///
/// Versioned names look like `{prefix}_{version}_001`, version aliases
/// like `{prefix}_{version}`.
fn newest_version(prefix: &str, index: &IndexDescriptor) -> Option<SchemaVersion> {
    let parse = |name: &str| -> Option<SchemaVersion> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
        let version = rest.split_once('_').map_or(rest, |(version, _)| version);
        version.parse().ok()
    };

    std::iter::once(index.name.as_str())
        .chain(index.aliases.iter().map(String::as_str))
        .filter_map(parse)
        .max()
}

// ============================================================================
// Error Transitions
// ============================================================================

fn on_error(mut state: State, error: ActionError) -> State {
    use ControlState as C;

    if error.is_retryable() {
        return retry(state, error);
    }

    match (state.control, error) {
        // Another instance already finished the legacy migration.
        (
            C::LegacySetWriteBlock | C::LegacyReindex | C::LegacyDelete,
            ActionError::IndexNotFound { index },
        ) => {
            state.log(
                LogLevel::Warning,
                format!("{index} disappeared, re-reading the index layout"),
            );
            state.legacy_index = None;
            state.with_control(C::Init)
        }

        // Another instance sealed the temporary index; its contents are complete.
        (C::WriteBatch, ActionError::TargetIndexHadWriteBlock { index }) => {
            state.log(
                LogLevel::Warning,
                format!("{index} already has a write block, skipping remaining batches"),
            );
            state.pending.clear();
            state.with_control(C::ClosePit)
        }

        // Another instance completed the cutover.
        (C::CloneTempToTarget, ActionError::IndexNotFound { index })
        | (C::UpdateAliases, ActionError::IndexNotFound { index }) => {
            state.log(
                LogLevel::Warning,
                format!("{index} disappeared, re-reading the index layout"),
            );
            state.source_index = None;
            state.with_control(C::Init)
        }
        (C::UpdateAliases, ActionError::AliasNotFound { alias }) => {
            state.log(
                LogLevel::Warning,
                format!("alias {alias} was moved concurrently, re-reading the index layout"),
            );
            state.source_index = None;
            state.with_control(C::Init)
        }

        (control, ActionError::IndexNotFound { index }) => {
            state.into_fatal(FatalReason::IndexNotFound {
                state: control,
                index,
            })
        }
        (_, ActionError::MappingConflict { index, reason }) => {
            state.into_fatal(FatalReason::MappingConflict { index, reason })
        }
        (C::WriteBatch, other) => {
            let index = state.temp_index.clone();
            state.into_fatal(FatalReason::BulkWriteFailed {
                index,
                message: other.to_string(),
            })
        }
        (control, other) => state.into_fatal(FatalReason::Unexpected {
            state: control,
            message: other.to_string(),
        }),
    }
}

/// Stays in the current state and schedules the same action after a
/// backoff delay, or gives up once the retry ceiling is reached.
fn retry(mut state: State, error: ActionError) -> State {
    let policy = &state.settings.retry;
    let attempts = state.retry_count.saturating_add(1);

    // A still-running reindex task is polled until it finishes.
    let unbounded = matches!(error, ActionError::TaskStillRunning { .. })
        && state.control == ControlState::LegacyReindexWaitForTask;

    if !unbounded && !policy.allows(attempts) {
        let reason = FatalReason::RetryCeilingExceeded {
            state: state.control,
            attempts,
            last_error: error.to_string(),
        };
        state.last_error = Some(error);
        return state.into_fatal(reason);
    }

    let retry_count = attempts.min(policy.max_retries.max(1));
    let delay = policy.delay_for(retry_count);
    state.retry_count = retry_count;
    state.total_retries = state.total_retries.saturating_add(1);
    state.retry_delay = delay;
    state.log(
        LogLevel::Warning,
        format!(
            "retry {retry_count} in {}ms: {error}",
            delay.as_millis()
        ),
    );
    state.last_error = Some(error);

    debug_assert!(unbounded || state.retry_count <= state.settings.retry.max_retries);
    state
}

impl State {
    fn reset_retries(mut self) -> Self {
        self.retry_count = 0;
        self.retry_delay = Duration::ZERO;
        self.last_error = None;
        self
    }
}
