//! Job domain types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::artifact::Artifact;
use crate::domain::log::{ProgressEvent, StepLog};

/// Snapshot of one synchronization job
///
/// Written only by the executor that owns the job; readers receive clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: Uuid,
    pub status: JobStatus,
    /// Fraction of the pipeline completed, in `[0.0, 1.0]`
    pub progress: f64,
    pub current_step: String,
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Stem used to name the published subtitle and the archive
    pub video_basename: String,
    pub logs: Vec<StepLog>,
    pub timeline: Vec<ProgressEvent>,
    pub detected_encoding: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub error_message: Option<String>,
}

impl JobState {
    /// Creates the initial, queued state of a freshly submitted job
    pub fn queued(id: Uuid, video_basename: impl Into<String>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0.0,
            current_step: "Queued".to_string(),
            message: "Waiting to start".to_string(),
            created_at: chrono::Utc::now(),
            video_basename: video_basename.into(),
            logs: Vec::new(),
            timeline: Vec::new(),
            detected_encoding: None,
            artifacts: Vec::new(),
            error_message: None,
        }
    }

    /// Looks up the captured result of a step by name
    pub fn log(&self, step: &str) -> Option<&StepLog> {
        self.logs.iter().find(|entry| entry.step == step)
    }
}

/// Job lifecycle status
///
/// Transitions only move forward: Queued -> Running -> {Completed, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed are absorbing
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only order
    ///
    /// Staying in a non-terminal status is allowed; leaving a terminal one is not.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Inputs for a new job, as handed over by the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInputs {
    /// Video file to align against
    pub video_path: PathBuf,
    /// Subtitle file to synchronize
    pub subtitle_path: PathBuf,
    /// Original video file name; the output is named after its stem
    pub video_name: Option<String>,
    /// Subtitle encoding supplied by the caller, skipping detection
    pub encoding_override: Option<String>,
    /// Treat the subtitle as SAMI regardless of its extension
    pub force_sami: bool,
}

impl JobInputs {
    pub fn new(video_path: impl Into<PathBuf>, subtitle_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            subtitle_path: subtitle_path.into(),
            video_name: None,
            encoding_override: None,
            force_sami: false,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding_override = Some(encoding.into());
        self
    }

    pub fn with_video_name(mut self, name: impl Into<String>) -> Self {
        self.video_name = Some(name.into());
        self
    }

    pub fn force_sami(mut self, force: bool) -> Self {
        self.force_sami = force;
        self
    }
}
