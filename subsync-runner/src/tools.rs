//! External tool invocations
//!
//! The pipeline talks to its three external tools (encoding detector,
//! subtitle normalizer, aligner) only through the [`StepRunner`] trait.
//! [`ProcessStepRunner`] is the production implementation: it spawns the
//! configured executables, captures their output, and turns a hang into a
//! failure once the step timeout elapses.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use subsync_core::domain::log::CommandResult;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ToolPaths;
use crate::error::{ExitIndication, ToolExecutionError};

/// Log name of the encoding detection step
pub const DETECT_STEP: &str = "uchardet";
/// Log name of the normalization step
pub const NORMALIZE_STEP: &str = "pysubs2";
/// Log name of the alignment step
pub const ALIGN_STEP: &str = "ffsubsync";

/// Labels that all denote the Korean Unified Hangul Code page
const UHC_LABELS: [&str; 7] = [
    "uhc",
    "cp949",
    "ms949",
    "ms_949",
    "windows-949",
    "949",
    "ks_c_5601-1987",
];

/// One tool invocation requested by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStep {
    /// Print the encoding of `subtitle` on stdout
    DetectEncoding { subtitle: PathBuf },
    /// Convert `input` (in `encoding`) to a UTF-8 SRT at `output`
    Normalize {
        input: PathBuf,
        output: PathBuf,
        encoding: String,
    },
    /// Write `subtitle` re-timed against `video` to `output`
    Align {
        video: PathBuf,
        subtitle: PathBuf,
        output: PathBuf,
    },
}

impl ToolStep {
    /// Name under which the step's result is logged
    pub fn log_name(&self) -> &'static str {
        match self {
            ToolStep::DetectEncoding { .. } => DETECT_STEP,
            ToolStep::Normalize { .. } => NORMALIZE_STEP,
            ToolStep::Align { .. } => ALIGN_STEP,
        }
    }
}

/// Executes one external tool invocation
///
/// Implementations must be safely re-invocable: no state carries over from
/// one call to the next.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Runs `step` with `cwd` as working directory
    async fn run(&self, step: ToolStep, cwd: &Path) -> Result<CommandResult, ToolExecutionError>;
}

/// Normalizes an encoding label as printed by the detector
///
/// Returns `None` for empty output or `unknown`; all code page 949 aliases
/// collapse to `uhc`.
pub fn normalize_encoding_label(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() || normalized == "unknown" {
        return None;
    }

    if UHC_LABELS.contains(&normalized.as_str()) {
        return Some("uhc".to_string());
    }

    Some(normalized)
}

/// StepRunner backed by real child processes
pub struct ProcessStepRunner {
    tools: ToolPaths,
    timeout: Duration,
}

impl ProcessStepRunner {
    /// Creates a runner for the given executables
    ///
    /// # Arguments
    /// * `tools` - Executables for detection, normalization and alignment
    /// * `timeout` - Maximum wall-clock time of a single invocation
    pub fn new(tools: ToolPaths, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    /// Builds the full command line for a step
    pub fn command_line(&self, step: &ToolStep) -> Vec<String> {
        match step {
            ToolStep::DetectEncoding { subtitle } => {
                vec![self.tools.detector.clone(), display(subtitle)]
            }
            ToolStep::Normalize {
                input,
                output,
                encoding,
            } => vec![
                self.tools.normalizer.clone(),
                "--to".to_string(),
                "srt".to_string(),
                "--input-enc".to_string(),
                encoding.clone(),
                "--output-enc".to_string(),
                "utf-8".to_string(),
                "-o".to_string(),
                display(output),
                display(input),
            ],
            ToolStep::Align {
                video,
                subtitle,
                output,
            } => vec![
                self.tools.aligner.clone(),
                display(video),
                "-i".to_string(),
                display(subtitle),
                "-o".to_string(),
                display(output),
                "--encoding".to_string(),
                "utf-8".to_string(),
                "--output-encoding".to_string(),
                "utf-8".to_string(),
            ],
        }
    }
}

#[async_trait]
impl StepRunner for ProcessStepRunner {
    async fn run(&self, step: ToolStep, cwd: &Path) -> Result<CommandResult, ToolExecutionError> {
        let command = self.command_line(&step);
        debug!("Executing {}: {}", step.log_name(), command.join(" "));

        let child = Command::new(&command[0])
            .args(&command[1..])
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolExecutionError::new(command.clone(), ExitIndication::SpawnFailed(e.to_string()))
            })?;

        // On timeout the child is dropped, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolExecutionError::new(
                    command,
                    ExitIndication::SpawnFailed(e.to_string()),
                ));
            }
            Err(_elapsed) => {
                warn!(
                    "{} exceeded the step timeout of {:?}",
                    step.log_name(),
                    self.timeout
                );
                return Err(ToolExecutionError::new(
                    command,
                    ExitIndication::TimedOut(self.timeout),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let exit = match output.status.code() {
                Some(code) => ExitIndication::Code(code),
                None => ExitIndication::Terminated,
            };
            debug!(
                "{} failed: exit={} stdout='{}' stderr='{}'",
                step.log_name(),
                exit,
                stdout.trim(),
                stderr.trim()
            );
            return Err(ToolExecutionError::new(command, exit).with_output(stdout, stderr));
        }

        debug!(
            "{} completed: stdout_len={}, stderr_len={}",
            step.log_name(),
            stdout.len(),
            stderr.len()
        );

        Ok(CommandResult::new(command, stdout, stderr))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
