//! Pipeline execution
//!
//! Drives one job through its stages, in order:
//! - Prepare: check the staged inputs, move the job to Running
//! - DetectEncoding: run the detector, or log the caller's override
//! - Normalize: convert the subtitle to UTF-8 SRT
//! - Backup: preserve same-named subtitles as `.bk`
//! - Align: synchronize against the video into a temporary file
//! - Finalize: publish the aligned subtitle, collect backups
//! - Package: zip subtitle and backups when there are backups
//! - Complete: mark the job Completed with its artifacts
//!
//! Any failure stops the pipeline, marks the job Failed with the error
//! message, and deletes the job's workspace. Faults that are not ordinary
//! stage failures (registry contract violations, panics) are handled the
//! same way and then handed back to whoever awaits the pipeline task.
//! Whatever the outcome, the job's expiry countdown starts exactly once.

use std::any::Any;
use std::sync::Arc;
use subsync_core::domain::artifact::{Artifact, ArtifactKind};
use subsync_core::domain::job::JobStatus;
use subsync_core::domain::log::CommandResult;
use subsync_core::domain::stage::Stage;
use tracing::{error, info, warn};

use crate::archive::create_zip_archive;
use crate::context::JobContext;
use crate::error::{EngineError, ExitIndication, Result, ToolExecutionError};
use crate::registry::JobUpdate;
use crate::scheduler::ExpiryTrigger;
use crate::tools::{DETECT_STEP, ToolStep, normalize_encoding_label};

/// Runs a single job's pipeline once
pub struct PipelineExecutor {
    context: Arc<JobContext>,
}

impl PipelineExecutor {
    pub fn new(context: JobContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Runs the pipeline to completion or failure
    ///
    /// Returns the terminal status for completed and ordinarily failed jobs,
    /// or the fault for unexpected ones. A panic inside a stage is resumed
    /// after the job has been failed and cleaned up.
    pub async fn run(self, expiry: ExpiryTrigger) -> Result<JobStatus> {
        let job_id = self.context.job_id;
        info!("Starting pipeline for job {}", job_id);

        // Stages run in their own task so a panic surfaces here as a JoinError
        // instead of skipping the cleanup below.
        let context = Arc::clone(&self.context);
        let stages = tokio::spawn(async move { run_stages(&context).await });

        let outcome = match stages.await {
            Ok(Ok(artifacts)) => match self.complete(artifacts) {
                Ok(()) => Ok(JobStatus::Completed),
                Err(e) => self.fail(e).await,
            },
            Ok(Err(e)) => self.fail(e).await,
            Err(join_error) => {
                let panicked = join_error.is_panic();
                let payload = panicked.then(|| join_error.into_panic());
                let reason = match &payload {
                    Some(payload) => {
                        format!("pipeline panicked: {}", panic_message(payload.as_ref()))
                    }
                    None => "pipeline task was cancelled".to_string(),
                };

                let fault = self.fail(EngineError::Unexpected(reason)).await;
                expiry.fire();

                if let Some(payload) = payload {
                    std::panic::resume_unwind(payload);
                }
                return fault;
            }
        };

        expiry.fire();
        outcome
    }

    fn complete(&self, artifacts: Vec<Artifact>) -> Result<()> {
        let context = &self.context;
        context.enter(Stage::Complete)?;
        context.registry.apply_update(
            context.job_id,
            JobUpdate::new()
                .status(JobStatus::Completed)
                .progress(Stage::Complete.checkpoint())
                .message(Stage::Complete.done_message())
                .artifacts(artifacts),
        )?;
        info!("Job {} completed", context.job_id);
        Ok(())
    }

    /// Marks the job Failed and removes its workspace
    ///
    /// Ordinary stage failures resolve to `Ok(Failed)`; anything else is
    /// returned as the error after the job state has been settled.
    async fn fail(&self, err: EngineError) -> Result<JobStatus> {
        let context = &self.context;
        let message = err.to_string();

        if err.is_stage_failure() {
            warn!("Job {} failed: {}", context.job_id, message);
        } else {
            error!("Job {} hit an unexpected fault: {}", context.job_id, message);
        }

        let update = JobUpdate::new()
            .status(JobStatus::Failed)
            .message("Processing failed")
            .error_message(message);
        if let Err(e) = context.registry.apply_update(context.job_id, update) {
            error!("Could not mark job {} as failed: {}", context.job_id, e);
        }

        context.workspace.remove().await;

        if err.is_stage_failure() {
            Ok(JobStatus::Failed)
        } else {
            Err(err)
        }
    }
}

async fn run_stages(context: &JobContext) -> Result<Vec<Artifact>> {
    let workspace = &context.workspace;

    context.enter(Stage::Prepare)?;
    workspace.verify_inputs().await?;
    context.reach(Stage::Prepare)?;

    context.enter(Stage::DetectEncoding)?;
    let encoding = determine_encoding(context).await?;
    context.reach_with(
        Stage::DetectEncoding,
        JobUpdate::new().detected_encoding(encoding.clone()),
    )?;

    context.enter(Stage::Normalize)?;
    context
        .run_tool(ToolStep::Normalize {
            input: workspace.subtitle().to_path_buf(),
            output: workspace.normalized(),
            encoding,
        })
        .await?;
    context.reach(Stage::Normalize)?;

    context.enter(Stage::Backup)?;
    workspace.backup_existing().await?;
    context.reach(Stage::Backup)?;

    context.enter(Stage::Align)?;
    context
        .run_tool(ToolStep::Align {
            video: workspace.video().to_path_buf(),
            subtitle: workspace.normalized(),
            output: workspace.aligned_temp(),
        })
        .await?;
    context.reach(Stage::Align)?;

    context.enter(Stage::Finalize)?;
    let published = workspace.publish().await?;
    let backups = workspace.collect_backups().await;
    let mut artifacts = vec![Artifact {
        kind: ArtifactKind::Subtitle,
        name: workspace.published_name(),
        path: published,
    }];
    for backup in backups {
        let name = backup
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        artifacts.push(Artifact {
            kind: ArtifactKind::Backup,
            name,
            path: backup,
        });
    }
    context.reach(Stage::Finalize)?;

    context.enter(Stage::Package)?;
    if artifacts.len() > 1 {
        let archive = package(context, &artifacts).await?;
        artifacts.push(archive);
    }
    context.reach(Stage::Package)?;

    Ok(artifacts)
}

/// Uses the caller's override or runs the detector
async fn determine_encoding(context: &JobContext) -> Result<String> {
    if let Some(encoding) = &context.encoding_override {
        context.record(
            DETECT_STEP,
            CommandResult::new(
                vec!["encoding".to_string(), "override".to_string()],
                format!("User override: {}", encoding),
                "",
            ),
        )?;
        return Ok(encoding.clone());
    }

    let result = context
        .run_tool(ToolStep::DetectEncoding {
            subtitle: context.workspace.subtitle().to_path_buf(),
        })
        .await?;

    match normalize_encoding_label(&result.stdout) {
        Some(encoding) => Ok(encoding),
        None => Err(ToolExecutionError::new(
            result.command,
            ExitIndication::UnusableOutput("Unable to detect subtitle encoding".to_string()),
        )
        .with_output(result.stdout, result.stderr)
        .into()),
    }
}

/// Bundles the published subtitle and its backups into one zip
async fn package(context: &JobContext, artifacts: &[Artifact]) -> Result<Artifact> {
    let destination = context.workspace.archive();
    let files: Vec<_> = artifacts
        .iter()
        .map(|a| (a.name.clone(), a.path.clone()))
        .collect();

    let target = destination.clone();
    tokio::task::spawn_blocking(move || create_zip_archive(&files, &target))
        .await
        .map_err(|e| EngineError::Unexpected(format!("archive task failed: {}", e)))??;

    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Artifact {
        kind: ArtifactKind::Archive,
        name,
        path: destination,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
