//! Pipeline stage definitions
//!
//! A job runs these stages strictly in declaration order. Each stage owns a
//! fixed progress checkpoint that is published once the stage finishes, even
//! when the stage had nothing to do.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Prepare,
    DetectEncoding,
    Normalize,
    Backup,
    Align,
    Finalize,
    Package,
    Complete,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 8] = [
        Stage::Prepare,
        Stage::DetectEncoding,
        Stage::Normalize,
        Stage::Backup,
        Stage::Align,
        Stage::Finalize,
        Stage::Package,
        Stage::Complete,
    ];

    /// Progress value published when the stage has finished
    pub fn checkpoint(self) -> f64 {
        match self {
            Stage::Prepare => 0.10,
            Stage::DetectEncoding => 0.25,
            Stage::Normalize => 0.45,
            Stage::Backup => 0.60,
            Stage::Align => 0.80,
            Stage::Finalize => 0.90,
            Stage::Package => 0.95,
            Stage::Complete => 1.0,
        }
    }

    /// Human-readable label used as the job's current step
    pub fn label(self) -> &'static str {
        match self {
            Stage::Prepare => "Preparing inputs",
            Stage::DetectEncoding => "Detecting encoding",
            Stage::Normalize => "Normalizing subtitles",
            Stage::Backup => "Backing up existing subtitles",
            Stage::Align => "Aligning subtitles",
            Stage::Finalize => "Publishing subtitles",
            Stage::Package => "Packaging results",
            Stage::Complete => "Completed",
        }
    }

    /// Message published together with the checkpoint
    pub fn done_message(self) -> &'static str {
        match self {
            Stage::Prepare => "Inputs staged",
            Stage::DetectEncoding => "Encoding determined",
            Stage::Normalize => "Normalized subtitles",
            Stage::Backup => "Existing subtitles preserved",
            Stage::Align => "Aligned subtitles",
            Stage::Finalize => "Published synchronized subtitles",
            Stage::Package => "Results packaged",
            Stage::Complete => "Synchronization complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
