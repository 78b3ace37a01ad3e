//! Job service
//!
//! The boundary the transport layer talks to: submit a job, poll its
//! status, fetch its result. Submission validates and stages the inputs,
//! registers the job, and launches its pipeline in the background.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use subsync_core::domain::artifact::ArtifactKind;
use subsync_core::domain::job::{JobInputs, JobState, JobStatus};
use subsync_core::dto::job::{JobResultView, JobStatusView};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::context::JobContext;
use crate::error::{EngineError, Result};
use crate::registry::JobRegistry;
use crate::scheduler::ExpirationReaper;
use crate::service::execution::PipelineExecutor;
use crate::tools::{ProcessStepRunner, StepRunner};
use crate::workspace::{JobWorkspace, dotted_extension, sanitize_basename};

/// Accepted video extensions
pub const VIDEO_EXTENSIONS: [&str; 4] = [".mkv", ".mp4", ".avi", ".mov"];
/// Accepted subtitle extensions
pub const SUBTITLE_EXTENSIONS: [&str; 6] = [".smi", ".srt", ".ass", ".ssa", ".sub", ".vtt"];

/// Handles of a submitted job's background work
///
/// Production callers may drop both handles; tests await them.
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    /// Resolves to the terminal status, or to the fault that ended the pipeline
    pub pipeline: JoinHandle<Result<JobStatus>>,
    /// Resolves once the job's registry entry has expired
    pub expiry: JoinHandle<()>,
}

/// Service trait for submitting and observing jobs
#[async_trait]
pub trait JobService: Send + Sync {
    /// Validates and stages the inputs, then starts the job in the background
    ///
    /// # Returns
    /// Handles of the new job; fails with `Validation` without creating a job
    async fn submit(&self, inputs: JobInputs) -> Result<JobHandle>;

    /// Current progress of a job, without waiting on its pipeline
    fn get_status(&self, id: Uuid) -> Result<JobStatusView>;

    /// Artifacts and logs of a concluded job
    ///
    /// `StillProcessing` while the job runs; `NotFound` for unknown or
    /// expired jobs, including completed jobs whose output was reclaimed.
    async fn get_result(&self, id: Uuid) -> Result<JobResultView>;
}

/// Standard implementation of JobService
pub struct StandardJobService {
    config: Config,
    registry: Arc<JobRegistry>,
    runner: Arc<dyn StepRunner>,
    reaper: ExpirationReaper,
}

impl StandardJobService {
    /// Creates a service with a fresh registry
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `runner` - Executes the external tools
    pub fn new(config: Config, runner: Arc<dyn StepRunner>) -> Self {
        Self::with_registry(config, runner, Arc::new(JobRegistry::new()))
    }

    /// Creates a service around an existing registry
    pub fn with_registry(
        config: Config,
        runner: Arc<dyn StepRunner>,
        registry: Arc<JobRegistry>,
    ) -> Self {
        let reaper = ExpirationReaper::new(
            Arc::clone(&registry),
            config.workspace_root.clone(),
            config.job_ttl,
        );
        Self {
            config,
            registry,
            runner,
            reaper,
        }
    }

    /// Creates a service that runs the configured tools as child processes
    pub fn from_config(config: Config) -> Self {
        let runner = ProcessStepRunner::new(config.tools.clone(), config.step_timeout);
        Self::new(config, Arc::new(runner))
    }

    /// Startup pass: reclaims workspaces left over from earlier runs
    pub async fn startup(&self) -> usize {
        let removed = self.reaper.sweep_now().await;
        info!(
            "Startup sweep of {} reclaimed {} workspace(s)",
            self.config.workspace_root.display(),
            removed.len()
        );
        removed.len()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn reaper(&self) -> &ExpirationReaper {
        &self.reaper
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl JobService for StandardJobService {
    async fn submit(&self, inputs: JobInputs) -> Result<JobHandle> {
        self.reaper.sweep_now().await;

        validate_inputs(&self.config, &inputs).await?;

        let video_name = inputs
            .video_name
            .clone()
            .unwrap_or_else(|| file_name(&inputs.video_path));
        let basename = sanitize_basename(&video_name);
        let encoding_override = inputs
            .encoding_override
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        let job_id = Uuid::new_v4();
        let workspace =
            JobWorkspace::stage(&self.config.workspace_root, job_id, &basename, &inputs).await?;

        if let Err(e) = self.registry.register(JobState::queued(job_id, &basename)) {
            workspace.remove().await;
            return Err(e);
        }

        let (trigger, expiry) = self.reaper.arm(job_id, workspace.dir().to_path_buf());
        let context = JobContext::new(
            job_id,
            Arc::clone(&self.registry),
            Arc::clone(&self.runner),
            workspace,
            encoding_override,
        );
        let pipeline = tokio::spawn(PipelineExecutor::new(context).run(trigger));

        info!("Submitted job {} for '{}'", job_id, video_name);

        Ok(JobHandle {
            id: job_id,
            pipeline,
            expiry,
        })
    }

    fn get_status(&self, id: Uuid) -> Result<JobStatusView> {
        let job = self.registry.get(id)?;
        Ok(JobStatusView::from(&job))
    }

    async fn get_result(&self, id: Uuid) -> Result<JobResultView> {
        let job = self.registry.get(id)?;

        if !job.status.is_terminal() {
            return Err(EngineError::StillProcessing(id));
        }

        let view = JobResultView::from(job);
        if view.status == JobStatus::Completed {
            let published = view
                .artifact(ArtifactKind::Subtitle)
                .map(|a| a.path.clone());
            let present = match published {
                Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
                None => false,
            };
            if !present {
                debug!("Output of job {} is gone; treating as expired", id);
                return Err(EngineError::NotFound(id));
            }
        }

        Ok(view)
    }
}

/// Checks file presence, extensions and size limits
async fn validate_inputs(config: &Config, inputs: &JobInputs) -> Result<()> {
    let video_name = inputs
        .video_name
        .as_deref()
        .map(Path::new)
        .unwrap_or(&inputs.video_path);
    ensure_extension(video_name, &VIDEO_EXTENSIONS)?;
    ensure_extension(&inputs.subtitle_path, &SUBTITLE_EXTENSIONS)?;

    ensure_within_limit(&inputs.video_path, "Video", config.max_video_bytes).await?;
    ensure_within_limit(&inputs.subtitle_path, "Subtitle", config.max_subtitle_bytes).await?;
    Ok(())
}

fn ensure_extension(path: &Path, allowed: &[&str]) -> Result<()> {
    let extension = dotted_extension(path);
    if !allowed.contains(&extension.as_str()) {
        return Err(EngineError::Validation(format!(
            "File '{}' has an unsupported extension",
            file_name(path)
        )));
    }
    Ok(())
}

async fn ensure_within_limit(path: &Path, what: &str, max_bytes: u64) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|_| {
        EngineError::Validation(format!("{} file '{}' does not exist", what, path.display()))
    })?;

    if !metadata.is_file() {
        return Err(EngineError::Validation(format!(
            "{} '{}' is not a regular file",
            what,
            path.display()
        )));
    }

    if metadata.len() > max_bytes {
        return Err(EngineError::Validation(format!(
            "File '{}' exceeds the size limit",
            file_name(path)
        )));
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
