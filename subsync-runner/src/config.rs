//! Engine configuration
//!
//! Defines where job workspaces live, how long they are kept, how long a
//! single tool invocation may run, upload size limits, and which executables
//! implement the detection, normalization and alignment steps.

use std::path::PathBuf;
use std::time::Duration;

/// Executables invoked by the process-backed step runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Encoding detector (prints the detected label on stdout)
    pub detector: String,
    /// Subtitle normalizer (converts any input format to UTF-8 SRT)
    pub normalizer: String,
    /// Subtitle aligner (synchronizes an SRT against the video)
    pub aligner: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            detector: "uchardet".to_string(),
            normalizer: "pysubs2".to_string(),
            aligner: "ffsubsync".to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one sub-directory per job
    pub workspace_root: PathBuf,

    /// How long a job's workspace and registry entry outlive its conclusion
    pub job_ttl: Duration,

    /// Upper bound on a single tool invocation; exceeding it fails the step
    pub step_timeout: Duration,

    /// Largest accepted video input
    pub max_video_bytes: u64,

    /// Largest accepted subtitle input
    pub max_subtitle_bytes: u64,

    pub tools: ToolPaths,
}

impl Config {
    /// Creates a new configuration with defaults for everything but the root
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            job_ttl: Duration::from_secs(60 * 60),
            step_timeout: Duration::from_secs(30 * 60),
            max_video_bytes: 8 * 1024 * 1024 * 1024,
            max_subtitle_bytes: 20 * 1024 * 1024,
            tools: ToolPaths::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - SUBSYNC_WORKSPACE_ROOT (default: /tmp/subsync_jobs)
    /// - SUBSYNC_JOB_TTL (seconds, default: 3600)
    /// - SUBSYNC_STEP_TIMEOUT (seconds, default: 1800)
    /// - SUBSYNC_MAX_VIDEO_BYTES (default: 8 GiB)
    /// - SUBSYNC_MAX_SUBTITLE_BYTES (default: 20 MiB)
    /// - SUBSYNC_DETECTOR, SUBSYNC_NORMALIZER, SUBSYNC_ALIGNER (tool executables)
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("SUBSYNC_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(root);
        }

        if let Some(secs) = parse_env::<u64>("SUBSYNC_JOB_TTL")? {
            config.job_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_env::<u64>("SUBSYNC_STEP_TIMEOUT")? {
            config.step_timeout = Duration::from_secs(secs);
        }

        if let Some(bytes) = parse_env::<u64>("SUBSYNC_MAX_VIDEO_BYTES")? {
            config.max_video_bytes = bytes;
        }

        if let Some(bytes) = parse_env::<u64>("SUBSYNC_MAX_SUBTITLE_BYTES")? {
            config.max_subtitle_bytes = bytes;
        }

        if let Ok(detector) = std::env::var("SUBSYNC_DETECTOR") {
            config.tools.detector = detector;
        }
        if let Ok(normalizer) = std::env::var("SUBSYNC_NORMALIZER") {
            config.tools.normalizer = normalizer;
        }
        if let Ok(aligner) = std::env::var("SUBSYNC_ALIGNER") {
            config.tools.aligner = aligner;
        }

        Ok(config)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl = ttl;
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            anyhow::bail!("workspace_root cannot be empty");
        }

        if self.job_ttl.is_zero() {
            anyhow::bail!("job_ttl must be greater than 0");
        }

        if self.step_timeout.is_zero() {
            anyhow::bail!("step_timeout must be greater than 0");
        }

        if self.max_video_bytes == 0 || self.max_subtitle_bytes == 0 {
            anyhow::bail!("upload size limits must be greater than 0");
        }

        let tools = [
            ("detector", &self.tools.detector),
            ("normalizer", &self.tools.normalizer),
            ("aligner", &self.tools.aligner),
        ];
        for (name, program) in tools {
            if program.trim().is_empty() {
                anyhow::bail!("{} executable cannot be empty", name);
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from("/tmp/subsync_jobs"))
    }
}

fn parse_env<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", name, e)),
        Err(_) => Ok(None),
    }
}
