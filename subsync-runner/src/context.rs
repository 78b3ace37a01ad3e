//! Execution context for one job
//!
//! Bundles what a running pipeline needs: the registry it reports into,
//! the step runner, the job's workspace, and the caller's encoding override.
//! All state transitions of a job go through these helpers, so every stage
//! reports in the same shape.

use std::sync::Arc;
use subsync_core::domain::job::JobStatus;
use subsync_core::domain::log::CommandResult;
use subsync_core::domain::stage::Stage;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::registry::{JobRegistry, JobUpdate};
use crate::tools::{StepRunner, ToolStep};
use crate::workspace::JobWorkspace;

/// Execution context shared by the stages of one pipeline run
pub struct JobContext {
    pub job_id: Uuid,
    pub registry: Arc<JobRegistry>,
    pub runner: Arc<dyn StepRunner>,
    pub workspace: JobWorkspace,
    /// Encoding supplied by the caller; detection is skipped when set
    pub encoding_override: Option<String>,
}

impl JobContext {
    /// Creates a new execution context
    ///
    /// # Arguments
    /// * `job_id` - The registered job
    /// * `registry` - Registry holding the job's state
    /// * `runner` - Executes the external tools
    /// * `workspace` - The job's staged directory
    /// * `encoding_override` - Normalized caller override, if any
    pub fn new(
        job_id: Uuid,
        registry: Arc<JobRegistry>,
        runner: Arc<dyn StepRunner>,
        workspace: JobWorkspace,
        encoding_override: Option<String>,
    ) -> Self {
        Self {
            job_id,
            registry,
            runner,
            workspace,
            encoding_override,
        }
    }

    /// Publishes that `stage` is now active
    ///
    /// Entering the first stage also moves the job from Queued to Running.
    pub fn enter(&self, stage: Stage) -> Result<()> {
        debug!("Job {} entering stage: {}", self.job_id, stage);

        let mut update = JobUpdate::new().step(stage.label()).message(stage.label());
        if stage == Stage::Prepare {
            update = update.status(JobStatus::Running);
        }
        self.registry.apply_update(self.job_id, update)
    }

    /// Publishes the checkpoint of a finished stage
    pub fn reach(&self, stage: Stage) -> Result<()> {
        self.reach_with(stage, JobUpdate::new())
    }

    /// Publishes the checkpoint of a finished stage along with extra changes
    pub fn reach_with(&self, stage: Stage, update: JobUpdate) -> Result<()> {
        info!(
            "Job {} reached {:.0}%: {}",
            self.job_id,
            stage.checkpoint() * 100.0,
            stage.done_message()
        );
        self.registry.apply_update(
            self.job_id,
            update
                .progress(stage.checkpoint())
                .message(stage.done_message()),
        )
    }

    /// Appends a step result to the job's log
    pub fn record(&self, step: &str, result: CommandResult) -> Result<()> {
        self.registry.append_log(self.job_id, step, result)
    }

    /// Runs a tool in the job directory and logs its result
    pub async fn run_tool(&self, step: ToolStep) -> Result<CommandResult> {
        let name = step.log_name();
        debug!("Job {} running {}", self.job_id, name);

        let result = self.runner.run(step, self.workspace.dir()).await?;
        self.record(name, result.clone())?;
        Ok(result)
    }
}
