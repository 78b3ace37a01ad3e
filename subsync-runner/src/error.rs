//! Error types for the synchronization engine

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing input; no job is created
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The job id is unknown or its entry has expired
    #[error("Job {0} not found or expired")]
    NotFound(Uuid),

    /// A job with this id is already registered
    #[error("Job {0} is already registered")]
    DuplicateJob(Uuid),

    /// The job has not reached a terminal status yet
    #[error("Job {0} is still processing")]
    StillProcessing(Uuid),

    /// An update tried to move the job backwards or mutate a concluded job
    #[error("Invalid transition for job {job_id}: {reason}")]
    InvalidTransition { job_id: Uuid, reason: String },

    /// An external tool failed
    #[error(transparent)]
    Tool(#[from] ToolExecutionError),

    /// Filesystem operation failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the result archive failed
    #[error("Failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Anything else; surfaced to the operator after the job is failed
    #[error("Unexpected fault: {0}")]
    Unexpected(String),
}

impl EngineError {
    /// Wraps an I/O error with a description of what was attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this is an ordinary stage failure rather than an unexpected fault
    ///
    /// Stage failures end the job quietly; unexpected faults are additionally
    /// re-raised to whoever awaits the pipeline.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            Self::Tool(_) | Self::Io { .. } | Self::Archive(_) | Self::Validation(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// How a failed tool invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitIndication {
    /// Process exited with a non-zero code
    Code(i32),
    /// Process was terminated without an exit code (e.g. by a signal)
    Terminated,
    /// Process exceeded the step timeout and was killed
    TimedOut(Duration),
    /// Process could not be started
    SpawnFailed(String),
    /// Process succeeded but its output could not be used
    UnusableOutput(String),
}

impl std::fmt::Display for ExitIndication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitIndication::Code(code) => write!(f, "failed with exit code {}", code),
            ExitIndication::Terminated => write!(f, "was terminated"),
            ExitIndication::TimedOut(limit) => write!(f, "timed out after {:?}", limit),
            ExitIndication::SpawnFailed(reason) => write!(f, "could not be started: {}", reason),
            ExitIndication::UnusableOutput(reason) => {
                write!(f, "produced unusable output: {}", reason)
            }
        }
    }
}

/// Failure of a single external tool invocation
#[derive(Debug, Clone, Error)]
#[error("Command {} {exit}\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}", .command.join(" "))]
pub struct ToolExecutionError {
    pub command: Vec<String>,
    pub exit: ExitIndication,
    pub stdout: String,
    pub stderr: String,
}

impl ToolExecutionError {
    pub fn new(command: Vec<String>, exit: ExitIndication) -> Self {
        Self {
            command,
            exit,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_message_carries_output() {
        let err = ToolExecutionError::new(
            vec!["ffsubsync".to_string(), "clip.mp4".to_string()],
            ExitIndication::Code(2),
        )
        .with_output("partial", "boom");

        let message = err.to_string();
        assert!(message.starts_with("Command ffsubsync clip.mp4 failed with exit code 2"));
        assert!(message.contains("STDOUT:\npartial"));
        assert!(message.contains("STDERR:\nboom"));
    }

    #[test]
    fn test_stage_failure_classification() {
        let tool = EngineError::from(ToolExecutionError::new(
            vec!["uchardet".to_string()],
            ExitIndication::Terminated,
        ));
        assert!(tool.is_stage_failure());

        let io = EngineError::io("rename", std::io::Error::other("disk full"));
        assert!(io.is_stage_failure());
        assert_eq!(io.to_string(), "rename: disk full");

        assert!(!EngineError::NotFound(Uuid::new_v4()).is_stage_failure());
        assert!(!EngineError::Unexpected("bug".to_string()).is_stage_failure());
    }
}
