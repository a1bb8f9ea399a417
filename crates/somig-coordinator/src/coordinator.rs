//! Concurrent execution of several migrations.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use somig_actions::Actions;
use somig_kernel::{ControlState, FatalReason, MigrationSettings, State};
use somig_store::DocumentStore;
use somig_transform::{TransformPipeline, TypeRegistry};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::{CoordinatorError, Result};
use crate::plan::IndexPlan;
use crate::progress::{IndexProgress, ProgressSnapshot};
use crate::report::{IndexReport, MigrationReport, MigrationStatus};
use crate::runner::{DEFAULT_SHUTDOWN_GRACE, MigrationRunner};
use crate::shutdown::Shutdown;

/// Default bound on one [`Coordinator::migrate`] call.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Settings of a [`Coordinator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Migrations allowed to run at the same time.
    pub parallelism: usize,
    /// Cancels every migration still running once exceeded.
    pub overall_timeout: Option<Duration>,
    /// Time allowed to release resources after a failure.
    pub shutdown_grace: Duration,
    pub migration: MigrationSettings,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            parallelism: 4,
            overall_timeout: Some(DEFAULT_OVERALL_TIMEOUT),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            migration: MigrationSettings::default(),
        }
    }
}

/// Runs the migrations of many index prefixes against one store.
pub struct Coordinator<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    pipeline: TransformPipeline,
    settings: CoordinatorSettings,
    shutdown: Shutdown,
    progress: Arc<watch::Sender<ProgressSnapshot>>,
}

impl<S: DocumentStore + ?Sized + 'static> Coordinator<S> {
    pub fn new(store: Arc<S>, registry: TypeRegistry, settings: CoordinatorSettings) -> Self {
        Self::with_pipeline(store, TransformPipeline::new(registry), settings)
    }

    pub fn with_pipeline(
        store: Arc<S>,
        pipeline: TransformPipeline,
        settings: CoordinatorSettings,
    ) -> Self {
        let (progress, _) = watch::channel(ProgressSnapshot::default());
        Self {
            store,
            pipeline,
            settings,
            shutdown: Shutdown::new(),
            progress: Arc::new(progress),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Current progress of every planned prefix.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.borrow().clone()
    }

    /// Receives a notification on every progress change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Handle that cancels running migrations when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Cancels every running migration. Each ends fatal with `reason`.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.shutdown.trigger(reason);
    }

    /// Migrates every planned prefix and waits for all of them.
    ///
    /// Failures of individual prefixes are reported, never returned as
    /// errors; the others keep running.
    pub async fn migrate(&self, plans: Vec<IndexPlan>) -> Result<MigrationReport> {
        self.validate(&plans)?;
        // Scoped to this call so a timeout does not outlive it.
        let run = self.shutdown.child();

        info!(
            indices = plans.len(),
            parallelism = self.settings.parallelism,
            "starting migrations"
        );
        self.progress.send_replace(ProgressSnapshot {
            indices: plans
                .iter()
                .map(|plan| {
                    let state = self.initial_state(plan);
                    (plan.prefix.clone(), IndexProgress::of(&state))
                })
                .collect(),
        });

        let semaphore = Arc::new(Semaphore::new(self.settings.parallelism));
        let mut tasks = JoinSet::new();
        for (slot, plan) in plans.iter().enumerate() {
            let runner = MigrationRunner::new(self.actions(), self.initial_state(plan))
                .with_shutdown(run.clone())
                .with_shutdown_grace(self.settings.shutdown_grace)
                .with_progress(Arc::clone(&self.progress));
            let semaphore = Arc::clone(&semaphore);
            let shutdown = run.clone();

            tasks.spawn(async move {
                // A migration waiting for a slot still reports when cancelled.
                let _permit = tokio::select! {
                    biased;
                    () = shutdown.triggered() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                (slot, runner.run().await)
            });
        }

        let deadline = self.settings.overall_timeout.map(|t| (Instant::now() + t, t));
        let mut reports: Vec<Option<IndexReport>> = vec![None; plans.len()];
        loop {
            let joined = match deadline {
                Some((at, timeout)) if !run.is_triggered() => tokio::select! {
                    joined = tasks.join_next() => joined,
                    () = tokio::time::sleep_until(at) => {
                        run.trigger(format!("overall timeout of {timeout:?} exceeded"));
                        continue;
                    }
                },
                _ => tasks.join_next().await,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((slot, report)) => reports[slot] = Some(report),
                Err(e) => error!("migration task failed: {e}"),
            }
        }

        let indices: Vec<IndexReport> = reports
            .into_iter()
            .zip(&plans)
            .map(|(report, plan)| report.unwrap_or_else(|| self.lost_report(plan)))
            .collect();
        let report = MigrationReport::new(indices);

        match report.status {
            MigrationStatus::Done => info!(
                docs_written = report.docs_written(),
                "all migrations completed"
            ),
            MigrationStatus::Fatal => {
                if let Some((prefix, reason)) = report.fatal() {
                    error!(index = prefix, "migration failed: {reason}");
                }
            }
        }
        Ok(report)
    }

    fn validate(&self, plans: &[IndexPlan]) -> Result<()> {
        if self.settings.parallelism == 0 {
            return Err(CoordinatorError::ZeroParallelism);
        }
        let mut seen = BTreeSet::new();
        for plan in plans {
            if plan.prefix.is_empty() {
                return Err(CoordinatorError::EmptyPrefix);
            }
            if !seen.insert(plan.prefix.as_str()) {
                return Err(CoordinatorError::DuplicatePrefix(plan.prefix.clone()));
            }
        }
        Ok(())
    }

    fn actions(&self) -> Actions<S> {
        let migration = &self.settings.migration;
        Actions::new(Arc::clone(&self.store), self.pipeline.clone())
            .with_timeout(migration.action_timeout)
            .with_policy(migration.retry.clone())
            .with_keep_alive(migration.pit_keep_alive.clone())
    }

    fn initial_state(&self, plan: &IndexPlan) -> State {
        State::new(
            plan.prefix.clone(),
            plan.target_version,
            plan.mappings.clone(),
            self.settings.migration.clone(),
        )
    }

    /// Report of a migration whose task panicked.
    fn lost_report(&self, plan: &IndexPlan) -> IndexReport {
        let state = self.initial_state(plan).into_fatal(FatalReason::Unexpected {
            state: ControlState::Init,
            message: "migration task panicked".to_string(),
        });
        IndexReport::from_state(state, false, Duration::ZERO)
    }
}
