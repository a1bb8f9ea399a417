//! Configuration management commands.

use std::path::Path;

use anyhow::{Context, Result};
use somig_config::SomigConfig;

use crate::ConfigFormat;

/// Show the effective configuration.
pub fn show(project: &str, format: ConfigFormat) -> Result<()> {
    let config =
        SomigConfig::load_from_dir(Path::new(project)).context("Failed to load configuration")?;

    match format {
        ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        ConfigFormat::Toml => println!("{}", config.to_toml()?),
        ConfigFormat::Text => {
            println!("somig Configuration");
            println!("===================\n");

            println!("Migration:");
            println!("  Batch size: {}", config.migration.batch_size);
            println!("  Max retries: {}", config.migration.max_retries);
            println!("  Retry base delay: {}ms", config.migration.retry_base_delay_ms);
            println!("  PIT keep-alive: {}", config.migration.pit_keep_alive);
            println!("  Action timeout: {}s", config.migration.action_timeout_secs);
            println!(
                "  Transform error threshold: {}",
                config.migration.transform_error_threshold
            );
            println!();

            println!("Coordinator:");
            println!("  Parallelism: {}", config.coordinator.parallelism);
            match config.coordinator.overall_timeout_secs {
                0 => println!("  Overall timeout: none"),
                secs => println!("  Overall timeout: {secs}s"),
            }
            println!("  Shutdown grace: {}s", config.coordinator.shutdown_grace_secs);
            println!();

            println!("Store:");
            println!("  Failure probability: {}", config.store.failure_probability);
            println!("  Seed: {}", config.store.seed);
            println!("  Latency: {}ms", config.store.latency_ms);
            println!();

            println!("Logging:");
            println!("  Level: {}", config.logging.level);
            println!("  ANSI: {}", config.logging.ansi);
        }
    }

    Ok(())
}

/// Validate configuration files.
pub fn validate(project: &str) -> Result<()> {
    let project_path = Path::new(project);

    println!("Validating configuration in {}...", project_path.display());

    match SomigConfig::load_from_dir(project_path) {
        Ok(_) => {
            println!("✓ Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration validation failed:");
            println!("  {e:#}");
            Err(e)
        }
    }
}
