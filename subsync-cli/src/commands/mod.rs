//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod sweep;
mod sync;

pub use sweep::SweepArgs;
pub use sync::SyncArgs;

use anyhow::Result;
use clap::Subcommand;
use subsync_runner::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize a subtitle against a video
    Sync(SyncArgs),
    /// Reclaim job workspaces older than the TTL
    Sweep(SweepArgs),
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - Validated engine configuration
pub async fn handle_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Sync(args) => sync::handle_sync_command(args, config).await,
        Commands::Sweep(args) => sweep::handle_sweep_command(args, config).await,
    }
}
