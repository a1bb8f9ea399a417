//! Retry policy shared by the action executors and the state machine.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Explicit retry policy.
///
/// The store client never retries on its own. Executors consult the policy
/// to decide which store failures are retryable; the state machine consults
/// it for the retry ceiling and the backoff delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum consecutive retries of one action before the run is fatal.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential multiplier applied to `base_delay`.
    pub max_backoff_multiplier: u32,
    /// HTTP statuses that indicate a transient store failure.
    pub retryable_statuses: BTreeSet<u16>,
    /// Store error types that are transient regardless of status.
    pub retryable_error_types: BTreeSet<String>,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 15;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX_BACKOFF_MULTIPLIER: u32 = 64;

    /// Returns the delay before retry number `retry_count` (1-based).
    ///
    /// `base_delay * min(2^retry_count, max_backoff_multiplier)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let multiplier = 2u32
            .checked_pow(retry_count)
            .unwrap_or(u32::MAX)
            .min(self.max_backoff_multiplier.max(1));
        self.base_delay.saturating_mul(multiplier)
    }

    /// Returns true if `retry_count` retries are still within the ceiling.
    pub fn allows(&self, retry_count: u32) -> bool {
        retry_count <= self.max_retries
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    pub fn is_retryable_error_type(&self, error_type: &str) -> bool {
        self.retryable_error_types.contains(error_type)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_delay: Self::DEFAULT_BASE_DELAY,
            max_backoff_multiplier: Self::DEFAULT_MAX_BACKOFF_MULTIPLIER,
            retryable_statuses: [401, 403, 408, 410, 429, 502, 503, 504].into_iter().collect(),
            retryable_error_types: ["snapshot_in_progress_exception".to_string()]
                .into_iter()
                .collect(),
        }
    }
}
