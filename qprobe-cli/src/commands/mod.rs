//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod history;
mod verify;

use anyhow::Result;
use clap::Subcommand;
use qprobe_monitor::{Config, VerificationCoordinator};

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Dispatch a probe job and follow it until it settles
    Verify {
        /// Give up following after this many seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Retry the last verification if it failed or timed out
    Retry {
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Show the status cached by the server
    Status {
        /// Keep following a job that is still running
        #[arg(short, long)]
        follow: bool,
    },
    /// Refresh the general status and verify the worker
    Refresh {
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Show past verification results
    History {
        /// Delete the stored history
        #[arg(long)]
        clear: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The monitor configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let coordinator = VerificationCoordinator::from_config(config)?;

    let result = match command {
        Commands::Verify { timeout_secs } => verify::verify(&coordinator, timeout_secs).await,
        Commands::Retry { timeout_secs } => verify::retry(&coordinator, timeout_secs).await,
        Commands::Status { follow } => verify::status(&coordinator, follow).await,
        Commands::Refresh { timeout_secs } => verify::refresh(&coordinator, timeout_secs).await,
        Commands::History { clear } => history::show(&coordinator, clear),
    };

    coordinator.shutdown();
    result
}
