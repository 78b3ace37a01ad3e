//! Sync command handler
//!
//! Submits one job, follows its progress until it concludes, then prints
//! the timeline and tool logs and optionally copies the artifacts out.

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use subsync_core::domain::job::{JobInputs, JobStatus};
use subsync_core::domain::log::StepLog;
use subsync_core::dto::job::JobResultView;
use subsync_runner::{Config, JobService, StandardJobService};
use tracing::warn;

/// Arguments of `subsync sync`
#[derive(Args)]
pub struct SyncArgs {
    /// Video file to align against
    video: PathBuf,

    /// Subtitle file to synchronize
    subtitle: PathBuf,

    /// Subtitle encoding; skips detection when given
    #[arg(long)]
    encoding: Option<String>,

    /// Stage the subtitle as SAMI regardless of its extension
    #[arg(long)]
    force_sami: bool,

    /// Name used for the outputs instead of the video's file name
    #[arg(long)]
    video_name: Option<String>,

    /// Copy the artifacts into this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = 500)]
    poll_interval: u64,
}

/// Handle `subsync sync`
pub async fn handle_sync_command(args: SyncArgs, config: Config) -> Result<()> {
    let service = StandardJobService::from_config(config);
    service.startup().await;

    let mut inputs = JobInputs::new(&args.video, &args.subtitle).force_sami(args.force_sami);
    if let Some(encoding) = &args.encoding {
        inputs = inputs.with_encoding(encoding);
    }
    if let Some(name) = &args.video_name {
        inputs = inputs.with_video_name(name);
    }

    let handle = service
        .submit(inputs)
        .await
        .context("Failed to submit job")?;
    let id = handle.id;

    if !args.json {
        println!("{} {}", "Submitted job".bold(), id.to_string().cyan());
    }

    let interval = Duration::from_millis(args.poll_interval.max(10));
    let mut last_step = String::new();
    loop {
        let status = service.get_status(id)?;
        if !args.json && status.current_step != last_step {
            println!(
                "  {} {:>3.0}%  {}",
                "▸".cyan(),
                status.progress * 100.0,
                status.current_step
            );
            last_step = status.current_step.clone();
        }
        if status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    match handle.pipeline.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Pipeline ended with a fault: {}", e),
        Err(e) => return Err(anyhow!("Pipeline task failed: {}", e)),
    }

    let result = service.get_result(id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if result.status == JobStatus::Failed {
        bail!(
            "Job {} failed: {}",
            id,
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    if let Some(dir) = &args.output_dir {
        copy_artifacts(&result, dir).await?;
        if !args.json {
            println!(
                "\n{}",
                format!("Artifacts copied to {}", dir.display()).green()
            );
        }
    }

    Ok(())
}

/// Print the outcome, timeline and logs of a concluded job
fn print_result(result: &JobResultView) {
    println!("\n{}", "Result:".bold());
    println!("  Status:   {}", colorize_status(&result.status));
    if let Some(encoding) = &result.detected_encoding {
        println!("  Encoding: {}", encoding);
    }

    if !result.artifacts.is_empty() {
        println!("\n{}", "Artifacts:".bold());
        for artifact in &result.artifacts {
            println!(
                "  {:<9}{}  {}",
                artifact.kind.to_string().cyan(),
                artifact.name,
                artifact.path.display().to_string().dimmed()
            );
        }
    }

    println!("\n{}", "Timeline:".bold());
    for event in &result.timeline {
        println!(
            "  {}  {:>3.0}%  {}: {}",
            event.at.format("%H:%M:%S%.3f").to_string().dimmed(),
            event.progress * 100.0,
            event.step,
            event.message
        );
    }

    if !result.logs.is_empty() {
        println!("\n{}", "Logs:".bold());
        println!("{}", "─".repeat(80).dimmed());
        for log in &result.logs {
            print_step_log(log);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    if let Some(error) = &result.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn print_step_log(log: &StepLog) {
    println!("{} {}", "$".dimmed(), log.result.command_line());
    println!("  [{}]", log.step.cyan());
    for line in log.result.stdout.lines() {
        println!("  {}", line);
    }
    for line in log.result.stderr.lines() {
        println!("  {}", line.yellow());
    }
}

async fn copy_artifacts(result: &JobResultView, dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for artifact in &result.artifacts {
        let target = dir.join(&artifact.name);
        tokio::fs::copy(&artifact.path, &target)
            .await
            .with_context(|| format!("Failed to copy {}", artifact.name))?;
    }
    Ok(())
}

fn colorize_status(status: &JobStatus) -> colored::ColoredString {
    let status_str = format!("{:?}", status);
    match status {
        JobStatus::Queued => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Completed => status_str.green(),
        JobStatus::Failed => status_str.red(),
    }
}
