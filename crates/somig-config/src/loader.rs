//! Configuration loader with multi-source merging

use crate::{Paths, SomigConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "SOMIG".to_string(),
            user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "SOMIG")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/somig/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<SomigConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = SomigConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/somig/config.toml)
        if self.user_config
            && let Ok(user_config_file) = Paths::new().user_config_file()
            && user_config_file.exists()
        {
            builder = builder.add_source(
                config::File::from(user_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Project config (somig.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local config (somig.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (SOMIG_MIGRATION__BATCH_SIZE=500)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let somig_config: SomigConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        somig_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(somig_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> SomigConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn loader(project_dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("SOMIG_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config, SomigConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[migration]
batch_size = 250
pit_keep_alive = "2m"

[coordinator]
parallelism = 8
overall_timeout_secs = 600
"#;
        fs::write(project_dir.join("somig.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.migration.batch_size, 250);
        assert_eq!(config.migration.pit_keep_alive, "2m");
        assert_eq!(config.migration.max_retries, 15);
        assert_eq!(config.coordinator.parallelism, 8);
        assert_eq!(config.coordinator.overall_timeout_secs, 600);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("somig.toml"),
            "[coordinator]\nparallelism = 2\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("somig.local.toml"),
            "[coordinator]\nparallelism = 6\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.coordinator.parallelism, 6);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(project_dir.join("somig.toml"), "[migration]\nbatch_size = 0\n")
            .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("batch_size"));
        assert_eq!(loader(project_dir).load_or_default(), SomigConfig::default());
    }

    // Environment variables are not exercised here: setting them is unsafe
    // in this edition. In actual usage
    //
    // SOMIG_MIGRATION__BATCH_SIZE=500
    // SOMIG_COORDINATOR__PARALLELISM=2
    //
    // override the corresponding config file values.
}
