//! Coordinator error types.

use thiserror::Error;

/// Errors rejecting a migration request before any index is touched.
///
/// Failures of individual migrations are not errors: they are reported as
/// fatal entries of the [`MigrationReport`](crate::MigrationReport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("index prefix must not be empty")]
    EmptyPrefix,

    #[error("index prefix {0} is planned more than once")]
    DuplicatePrefix(String),

    #[error("parallelism must be at least 1")]
    ZeroParallelism,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
