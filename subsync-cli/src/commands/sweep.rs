//! Sweep command handler

use anyhow::Result;
use clap::Args;
use colored::*;
use std::sync::Arc;
use subsync_runner::scheduler::ExpirationReaper;
use subsync_runner::{Config, JobRegistry};

/// Arguments of `subsync sweep`
#[derive(Args)]
pub struct SweepArgs {
    /// List the reclaimed directories
    #[arg(short, long)]
    verbose: bool,
}

/// Runs one reaper pass over the workspace root
pub async fn handle_sweep_command(args: SweepArgs, config: Config) -> Result<()> {
    // Registry entries live only inside a running engine; this pass is filesystem-only.
    let reaper = ExpirationReaper::new(
        Arc::new(JobRegistry::new()),
        config.workspace_root.clone(),
        config.job_ttl,
    );
    let removed = reaper.sweep_now().await;

    if removed.is_empty() {
        println!(
            "{}",
            format!(
                "Nothing to reclaim in {}.",
                config.workspace_root.display()
            )
            .yellow()
        );
        return Ok(());
    }

    println!(
        "{}",
        format!("Reclaimed {} workspace(s).", removed.len()).green()
    );
    if args.verbose {
        for path in removed {
            println!("  {} {}", "▸".cyan(), path.display().to_string().dimmed());
        }
    }

    Ok(())
}
