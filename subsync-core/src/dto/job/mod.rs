//! Job DTOs returned to pollers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::artifact::{Artifact, ArtifactKind};
use crate::domain::job::{JobState, JobStatus};
use crate::domain::log::{ProgressEvent, StepLog};

/// Answer to a status poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub current_step: String,
    pub message: String,
    pub detected_encoding: Option<String>,
    pub error_message: Option<String>,
}

impl From<&JobState> for JobStatusView {
    fn from(job: &JobState) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            current_step: job.current_step.clone(),
            message: job.message.clone(),
            detected_encoding: job.detected_encoding.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// Outcome of a concluded job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultView {
    pub id: Uuid,
    pub status: JobStatus,
    pub artifacts: Vec<Artifact>,
    pub logs: Vec<StepLog>,
    pub timeline: Vec<ProgressEvent>,
    pub detected_encoding: Option<String>,
    pub error_message: Option<String>,
}

impl JobResultView {
    /// First artifact of the given kind, if any
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

impl From<JobState> for JobResultView {
    fn from(job: JobState) -> Self {
        Self {
            id: job.id,
            status: job.status,
            artifacts: job.artifacts,
            logs: job.logs,
            timeline: job.timeline,
            detected_encoding: job.detected_encoding,
            error_message: job.error_message,
        }
    }
}
