//! Step log types

use serde::{Deserialize, Serialize};

/// Captured output of one external tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(command: Vec<String>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            command,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// The command line joined with spaces, for display
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// One entry of a job's ordered step log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    /// Name of the step that produced the result (e.g. "ffsubsync")
    pub step: String,
    pub result: CommandResult,
}

/// A point on the job's processing timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub at: chrono::DateTime<chrono::Utc>,
    pub step: String,
    pub message: String,
    pub progress: f64,
}
