//! # somig-coordinator: Concurrent migration runner
//!
//! Drives the pure state machine of `somig-kernel` against a document store.
//!
//! - [`MigrationRunner`] executes the actions of one index prefix, waits out
//!   retry delays and releases the point-in-time when a run fails.
//! - [`Coordinator`] runs many prefixes with bounded parallelism, an
//!   optional overall timeout and cooperative cancellation.
//!
//! ```ignore
//! let coordinator = Coordinator::new(store, registry, CoordinatorSettings::default());
//! let report = coordinator
//!     .migrate(vec![IndexPlan::new(".kibana", version, mappings)])
//!     .await?;
//! assert_eq!(report.status, MigrationStatus::Done);
//! ```

mod coordinator;
mod error;
mod plan;
mod progress;
mod report;
mod runner;
mod shutdown;

pub use coordinator::{Coordinator, CoordinatorSettings, DEFAULT_OVERALL_TIMEOUT};
pub use error::{CoordinatorError, Result};
pub use plan::IndexPlan;
pub use progress::{IndexProgress, ProgressSnapshot};
pub use report::{IndexReport, MigrationReport, MigrationStatus};
pub use runner::MigrationRunner;
pub use shutdown::Shutdown;
