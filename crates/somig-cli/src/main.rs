//! somig command line.
//!
//! Runs saved-objects migrations against an in-memory document store,
//! optionally with injected faults, and inspects the layered configuration.
//!
//! # Quick Start
//!
//! ```bash
//! # Show the effective configuration
//! somig config show --format toml
//!
//! # Migrate two prefixes with 5% of store calls failing
//! somig simulate --docs 500 --fail-rate 0.05 --seed 7
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

/// somig - resumable saved-objects migrations for search-engine indices.
#[derive(Parser)]
#[command(name = "somig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Migrate generated documents in an in-memory store.
    Simulate(commands::simulate::SimulateArgs),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Directory containing somig.toml.
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Text)]
        format: ConfigFormat,
    },

    /// Check that the configuration loads and is valid.
    Validate {
        /// Directory containing somig.toml.
        #[arg(short, long, default_value = ".")]
        project: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Text,
    Json,
    Toml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Config(ConfigCommands::Show { project, format }) => {
            commands::config::show(&project, format)
        }
        Commands::Config(ConfigCommands::Validate { project }) => {
            commands::config::validate(&project)
        }
        Commands::Simulate(args) => commands::simulate::run(&args),
    }
}
