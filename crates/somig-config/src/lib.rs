//! Configuration management for somig
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (`SOMIG_*` prefix, `__` between sections)
//! 3. somig.local.toml (gitignored, local overrides)
//! 4. somig.toml (git-tracked, project config)
//! 5. ~/.config/somig/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use somig_coordinator::CoordinatorSettings;
use somig_kernel::MigrationSettings;
use somig_types::RetryPolicy;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main somig configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SomigConfig {
    pub migration: MigrationConfig,
    pub coordinator: CoordinatorConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Settings of each index migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub pit_keep_alive: String,
    pub action_timeout_secs: u64,
    pub transform_error_threshold: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: 1000,
            pit_keep_alive: "10m".to_string(),
            action_timeout_secs: 60,
            transform_error_threshold: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub parallelism: usize,
    /// Wall-clock bound on one run; `0` disables it.
    pub overall_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            overall_timeout_secs: 3600,
            shutdown_grace_secs: 10,
        }
    }
}

/// Behaviour of the in-memory store used by `somig simulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Probability that a store call fails transiently.
    pub failure_probability: f64,
    pub seed: u64,
    pub latency_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.0,
            seed: 0,
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl SomigConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migration.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "migration.batch_size must be at least 1".to_string(),
            ));
        }
        if self.coordinator.parallelism == 0 {
            return Err(ConfigError::ValidationError(
                "coordinator.parallelism must be at least 1".to_string(),
            ));
        }
        if self.migration.pit_keep_alive.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "migration.pit_keep_alive must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.store.failure_probability) {
            return Err(ConfigError::ValidationError(format!(
                "store.failure_probability must be within 0 and 1, got {}",
                self.store.failure_probability
            )));
        }
        Ok(())
    }

    pub fn migration_settings(&self) -> MigrationSettings {
        let migration = &self.migration;
        MigrationSettings {
            batch_size: migration.batch_size,
            retry: RetryPolicy::default()
                .with_max_retries(migration.max_retries)
                .with_base_delay(Duration::from_millis(migration.retry_base_delay_ms)),
            transform_error_threshold: migration.transform_error_threshold,
            pit_keep_alive: migration.pit_keep_alive.clone(),
            action_timeout: Duration::from_secs(migration.action_timeout_secs),
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            parallelism: self.coordinator.parallelism,
            overall_timeout: match self.coordinator.overall_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            shutdown_grace: Duration::from_secs(self.coordinator.shutdown_grace_secs),
            migration: self.migration_settings(),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SomigConfig::default();
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.max_retries, 15);
        assert_eq!(config.coordinator.parallelism, 4);
        assert_eq!(config.coordinator.overall_timeout_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_settings_match_defaults() {
        let config = SomigConfig::default();
        assert_eq!(config.migration_settings(), MigrationSettings::default());

        let coordinator = config.coordinator_settings();
        assert_eq!(coordinator, CoordinatorSettings::default());
    }

    #[test]
    fn test_overrides_reach_settings() {
        let mut config = SomigConfig::default();
        config.migration.max_retries = 3;
        config.migration.retry_base_delay_ms = 50;
        config.coordinator.overall_timeout_secs = 30;

        let settings = config.coordinator_settings();
        assert_eq!(settings.migration.retry.max_retries, 3);
        assert_eq!(settings.migration.retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(settings.overall_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_overall_timeout_disables_it() {
        let mut config = SomigConfig::default();
        assert_eq!(
            config.coordinator_settings().overall_timeout,
            Some(Duration::from_secs(3600))
        );

        config.coordinator.overall_timeout_secs = 0;
        assert_eq!(config.coordinator_settings().overall_timeout, None);
    }

    #[test]
    fn test_validation() {
        let mut config = SomigConfig::default();
        config.migration.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = SomigConfig::default();
        config.coordinator.parallelism = 0;
        assert!(config.validate().is_err());

        let mut config = SomigConfig::default();
        config.store.failure_probability = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = SomigConfig::default();
        config.coordinator.overall_timeout_secs = 120;

        let rendered = config.to_toml().expect("Failed to render config");
        assert!(rendered.contains("[migration]"));

        let parsed: SomigConfig = toml::from_str(&rendered).expect("Failed to parse config");
        assert_eq!(parsed, config);
    }
}
