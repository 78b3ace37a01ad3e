//! Subsync CLI
//!
//! Drives the synchronization engine in-process: submit a job and follow it
//! to the end, or reclaim expired job workspaces.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, handle_command};
use std::path::PathBuf;
use std::time::Duration;
use subsync_runner::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "subsync")]
#[command(about = "Subtitle synchronization CLI", long_about = None)]
struct Cli {
    /// Directory holding the per-job workspaces
    #[arg(long, env = "SUBSYNC_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Seconds a concluded job is kept before it is reclaimed
    #[arg(long, env = "SUBSYNC_JOB_TTL")]
    ttl: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "subsync=info,subsync_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(root) = cli.workspace_root {
        config.workspace_root = root;
    }
    if let Some(secs) = cli.ttl {
        config = config.with_ttl(Duration::from_secs(secs));
    }
    config.validate().context("Invalid configuration")?;

    handle_command(cli.command, config).await
}
