//! Runs one migration to completion.
//!
//! The runner owns the [`State`] of a single index prefix. It asks the
//! kernel for the next action, waits out the retry delay, executes the
//! action against the store and feeds the outcome back into the kernel
//! until the state is terminal.

use std::sync::Arc;
use std::time::Duration;

use somig_actions::Actions;
use somig_kernel::{Action, ControlState, State, apply, cancel, next_action};
use somig_store::DocumentStore;
use somig_types::ActionResult;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::progress::{IndexProgress, ProgressSnapshot};
use crate::report::IndexReport;
use crate::shutdown::Shutdown;

/// Default time allowed for cleanup after a failed or cancelled run.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Drives one [`State`] through the kernel.
pub struct MigrationRunner<S: DocumentStore + ?Sized> {
    actions: Actions<S>,
    state: State,
    shutdown: Shutdown,
    shutdown_grace: Duration,
    progress: Option<Arc<watch::Sender<ProgressSnapshot>>>,
}

impl<S: DocumentStore + ?Sized> MigrationRunner<S> {
    pub fn new(actions: Actions<S>, state: State) -> Self {
        Self {
            actions,
            state,
            shutdown: Shutdown::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            progress: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_progress(mut self, progress: Arc<watch::Sender<ProgressSnapshot>>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs until the migration is done, fatal or cancelled.
    pub async fn run(self) -> IndexReport {
        let Self {
            actions,
            mut state,
            shutdown,
            shutdown_grace,
            progress,
        } = self;
        let started = Instant::now();
        let prefix = state.prefix.clone();

        info!(index = %prefix, target = %state.target_index, "starting migration");
        publish(progress.as_deref(), &state);

        let mut next = next_action(&state);
        while let Some(action) = next {
            if shutdown.is_triggered() {
                state = cancel(state, shutdown.reason());
                break;
            }

            if !state.retry_delay.is_zero() {
                tokio::select! {
                    biased;
                    () = shutdown.triggered() => {
                        state = cancel(state, shutdown.reason());
                        break;
                    }
                    () = tokio::time::sleep(state.retry_delay) => {}
                }
            }

            let name = action.name();
            debug!(index = %prefix, control = %state.control, action = name, "executing action");
            let outcome = tokio::select! {
                biased;
                () = shutdown.triggered() => {
                    state = cancel(state, shutdown.reason());
                    break;
                }
                outcome = execute(&actions, action) => outcome,
            };

            let previous = state.control;
            let failed = outcome.is_err();
            (state, next) = apply(state, outcome);

            if failed && state.control == previous {
                if let Some(err) = &state.last_error {
                    warn!(
                        index = %prefix,
                        control = %state.control,
                        retry_count = state.retry_count,
                        delay_ms = state.retry_delay.as_millis() as u64,
                        "{name} failed, retrying: {err}"
                    );
                }
            } else if state.control != previous {
                debug!(index = %prefix, "{previous} -> {}", state.control);
            }
            publish(progress.as_deref(), &state);
        }

        let pit_leaked = release_pit(&actions, &mut state, shutdown_grace).await;
        publish(progress.as_deref(), &state);

        let elapsed = started.elapsed();
        match (&state.control, &state.fatal) {
            (ControlState::Done, _) => info!(
                index = %prefix,
                docs_written = state.docs_written,
                elapsed_ms = elapsed.as_millis() as u64,
                "migration completed"
            ),
            (_, Some(reason)) => error!(index = %prefix, kind = reason.kind(), "migration failed: {reason}"),
            (control, None) => error!(index = %prefix, "migration stopped in {control}"),
        }

        IndexReport::from_state(state, pit_leaked, elapsed)
    }
}

/// Executes one kernel action.
async fn execute<S: DocumentStore + ?Sized>(actions: &Actions<S>, action: Action) -> ActionResult {
    match action {
        Action::FetchIndices { prefix } => actions.fetch_indices(&prefix).await,
        Action::WaitForIndexStatus { index, status } => {
            actions.wait_for_index_status(&index, status).await
        }
        Action::CreateIndex {
            index,
            mappings,
            aliases,
        } => actions.create_index(&index, &mappings, &aliases).await,
        Action::SetWriteBlock { index } => actions.set_write_block(&index).await,
        Action::RemoveWriteBlock { index } => actions.remove_write_block(&index).await,
        Action::CloneIndex { source, target } => actions.clone_index(&source, &target).await,
        Action::Reindex { source, target } => actions.reindex(&source, &target).await,
        Action::WaitForTask { task } => actions.wait_for_task(&task).await,
        Action::UpdateAliases { actions: steps } => actions.update_aliases(&steps).await,
        Action::RefreshIndex { index } => actions.refresh(&index).await,
        Action::OpenPit { index } => actions.open_pit(&index).await,
        Action::ReadBatch {
            pit,
            search_after,
            batch_size,
        } => actions.read_batch(&pit, search_after, batch_size).await,
        Action::TransformBatch { documents } => actions.transform_batch(documents).await,
        Action::BulkWrite { index, documents } => actions.bulk_write(&index, &documents).await,
        Action::ClosePit { pit } => actions.close_pit(&pit).await,
    }
}

/// Closes a point-in-time a failed run left open.
///
/// Returns `true` when the PIT could not be closed within `grace`.
async fn release_pit<S: DocumentStore + ?Sized>(
    actions: &Actions<S>,
    state: &mut State,
    grace: Duration,
) -> bool {
    let Some(pit) = state.pit.clone() else {
        return false;
    };

    match tokio::time::timeout(grace, actions.close_pit(&pit)).await {
        Ok(Ok(_)) => {
            debug!(index = %state.prefix, "closed point-in-time of failed run");
            state.pit = None;
            false
        }
        Ok(Err(e)) => {
            warn!(index = %state.prefix, "failed to close point-in-time {pit}: {e}");
            true
        }
        Err(_) => {
            warn!(index = %state.prefix, "closing point-in-time {pit} timed out after {grace:?}");
            true
        }
    }
}

fn publish(progress: Option<&watch::Sender<ProgressSnapshot>>, state: &State) {
    if let Some(progress) = progress {
        progress.send_modify(|snapshot| {
            snapshot
                .indices
                .insert(state.prefix.clone(), IndexProgress::of(state));
        });
    }
}
