//! Service layer
//!
//! The job service is the engine's public surface; the executor drives a
//! single job's pipeline behind it.

mod execution;
mod jobs;

// Re-export traits
pub use jobs::JobService;

// Re-export implementations
pub use execution::PipelineExecutor;
pub use jobs::{JobHandle, StandardJobService, SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS};
