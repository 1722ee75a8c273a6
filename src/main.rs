//! Binary entry point for mirrorkeep.
//!
//! This binary provides the CLI interface for the mirroring engine, meant to
//! be run from cron or a systemd timer.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use mirrorkeep::config::{CONFIG_PATH_ENV, MirrorkeepConfig};
use mirrorkeep::observability::{self, InitOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Mirrorkeep - policy-driven retention and mirroring for remote file shares.
#[derive(Parser)]
#[command(name = "mirrorkeep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run mirror policies.
    Run {
        /// Policy file (default: `policies_path` from the configuration).
        #[arg(short, long)]
        policies: Option<PathBuf>,

        /// Run only this policy. May be repeated.
        #[arg(long = "policy", value_name = "NAME")]
        only: Vec<String>,

        /// Show what would be copied and pruned without making changes.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration and policies without touching any share.
    Check {
        /// Policy file (default: `policies_path` from the configuration).
        #[arg(short, long)]
        policies: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability =
        match observability::init_from_config(&config, InitOptions { verbose: cli.verbose }) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to initialize observability: {e}");
                return ExitCode::FAILURE;
            },
        };

    let result = match cli.command {
        Commands::Run {
            policies,
            only,
            dry_run,
        } => commands::cmd_run(&config, policies.as_deref(), &only, dry_run),
        Commands::Check { policies } => commands::cmd_check(&config, policies.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration.
fn load_config(path: Option<&str>) -> Result<MirrorkeepConfig, Box<dyn std::error::Error>> {
    // If a path is provided, load from that file
    if let Some(config_path) = path {
        return MirrorkeepConfig::load_from_file(Path::new(config_path))
            .map_err(std::convert::Into::into);
    }

    // Environment override for config path
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        if !config_path.trim().is_empty() {
            return MirrorkeepConfig::load_from_file(Path::new(&config_path))
                .map_err(std::convert::Into::into);
        }
    }

    // Otherwise, load from default location
    MirrorkeepConfig::load_default().map_err(std::convert::Into::into)
}
