//! Output artifact types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file produced by a successful job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// File name offered to the caller when downloading
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// The synchronized subtitle
    Subtitle,
    /// A pre-existing same-named subtitle preserved before publishing
    Backup,
    /// Zip bundle of the subtitle and its backups
    Archive,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Subtitle => write!(f, "subtitle"),
            ArtifactKind::Backup => write!(f, "backup"),
            ArtifactKind::Archive => write!(f, "archive"),
        }
    }
}
