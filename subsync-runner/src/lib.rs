//! Subtitle synchronization job engine
//!
//! Accepts a video and a subtitle, runs them through the external tool
//! pipeline (encoding detection, normalization, alignment) in the
//! background, and keeps per-job state in memory until it expires.
//!
//! ```no_run
//! use subsync_core::domain::job::JobInputs;
//! use subsync_runner::{Config, JobService, StandardJobService};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let service = StandardJobService::from_config(Config::from_env()?);
//! service.startup().await;
//!
//! let handle = service
//!     .submit(JobInputs::new("movie.mkv", "movie.smi"))
//!     .await?;
//! let status = service.get_status(handle.id)?;
//! println!("{} {:.0}%", status.current_step, status.progress * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod tools;
pub mod workspace;

pub use config::{Config, ToolPaths};
pub use error::{EngineError, ExitIndication, Result, ToolExecutionError};
pub use registry::{JobRegistry, JobUpdate};
pub use service::{JobHandle, JobService, StandardJobService};
pub use tools::{ProcessStepRunner, StepRunner, ToolStep};
