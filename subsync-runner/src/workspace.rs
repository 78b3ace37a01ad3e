//! Per-job workspace
//!
//! Every job owns one directory under the workspace root:
//!
//! ```text
//! <root>/<job id>/
//!     original_video.<ext>        staged video
//!     <basename>.<ext>            staged subtitle
//!     normalized_sub.srt          normalizer output
//!     aligned_temp.srt            aligner output before publishing
//!     <basename>.srt              published subtitle
//!     <basename>.srt.bk           backup of a pre-existing subtitle
//!     <basename>.smi.bk
//!     <basename>_results.zip      bundle, only when backups exist
//! ```
//!
//! The executor owns the directory until the job concludes; afterwards only
//! the reaper touches it.

use std::path::{Path, PathBuf};
use subsync_core::domain::job::JobInputs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Subtitle extensions that get backed up before publishing
const BACKUP_EXTENSIONS: [&str; 2] = ["srt", "smi"];

const NORMALIZED_STEM: &str = "normalized_sub";
const ALIGNED_STEM: &str = "aligned_temp";

/// File layout of one job directory
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    dir: PathBuf,
    basename: String,
    video: PathBuf,
    subtitle: PathBuf,
}

impl JobWorkspace {
    /// Creates the job directory and copies the inputs into it
    ///
    /// The directory is removed again if staging fails half-way.
    ///
    /// # Arguments
    /// * `root` - Workspace root holding all job directories
    /// * `job_id` - Id of the new job, used as directory name
    /// * `basename` - Stem of the published subtitle
    /// * `inputs` - Validated caller inputs
    pub async fn stage(
        root: &Path,
        job_id: Uuid,
        basename: &str,
        inputs: &JobInputs,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| EngineError::io("Failed to create workspace root", e))?;

        let dir = root.join(job_id.simple().to_string());
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| EngineError::io("Failed to create job directory", e))?;

        let video_name = inputs
            .video_name
            .as_deref()
            .map(Path::new)
            .unwrap_or(&inputs.video_path);
        let video = dir.join(format!("original_video{}", dotted_extension(video_name)));

        let subtitle_ext = if inputs.force_sami {
            ".smi".to_string()
        } else {
            dotted_extension(&inputs.subtitle_path)
        };
        let subtitle = dir.join(format!("{}{}", basename, subtitle_ext));

        let workspace = Self {
            dir,
            basename: basename.to_string(),
            video,
            subtitle,
        };

        if let Err(e) = workspace.copy_inputs(inputs).await {
            workspace.remove().await;
            return Err(e);
        }

        debug!("Staged inputs for job {} in {}", job_id, workspace.dir.display());
        Ok(workspace)
    }

    async fn copy_inputs(&self, inputs: &JobInputs) -> Result<()> {
        tokio::fs::copy(&inputs.video_path, &self.video)
            .await
            .map_err(|e| EngineError::io("Failed to stage video", e))?;
        tokio::fs::copy(&inputs.subtitle_path, &self.subtitle)
            .await
            .map_err(|e| EngineError::io("Failed to stage subtitle", e))?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn video(&self) -> &Path {
        &self.video
    }

    pub fn subtitle(&self) -> &Path {
        &self.subtitle
    }

    pub fn normalized(&self) -> PathBuf {
        self.dir.join(format!("{}.srt", NORMALIZED_STEM))
    }

    pub fn aligned_temp(&self) -> PathBuf {
        self.dir.join(format!("{}.srt", ALIGNED_STEM))
    }

    pub fn published_name(&self) -> String {
        format!("{}.srt", self.basename)
    }

    pub fn published(&self) -> PathBuf {
        self.dir.join(self.published_name())
    }

    pub fn archive(&self) -> PathBuf {
        self.dir.join(format!("{}_results.zip", self.basename))
    }

    fn backup_pairs(&self) -> impl Iterator<Item = (PathBuf, PathBuf)> + '_ {
        BACKUP_EXTENSIONS.iter().map(|ext| {
            let original = self.dir.join(format!("{}.{}", self.basename, ext));
            let backup = self.dir.join(format!("{}.{}.bk", self.basename, ext));
            (original, backup)
        })
    }

    /// Checks that both staged inputs are present
    pub async fn verify_inputs(&self) -> Result<()> {
        for (what, path) in [("video", &self.video), ("subtitle", &self.subtitle)] {
            let metadata = tokio::fs::metadata(path)
                .await
                .map_err(|e| EngineError::io(format!("Staged {} is missing", what), e))?;
            if !metadata.is_file() {
                return Err(EngineError::Validation(format!(
                    "Staged {} is not a regular file",
                    what
                )));
            }
        }
        Ok(())
    }

    /// Renames same-named subtitles to `.bk` so publishing cannot overwrite them
    ///
    /// Idempotent: an existing backup is replaced and a missing original is skipped.
    pub async fn backup_existing(&self) -> Result<Vec<PathBuf>> {
        let mut backups = Vec::new();
        for (original, backup) in self.backup_pairs() {
            if !tokio::fs::try_exists(&original).await.unwrap_or(false) {
                continue;
            }
            tokio::fs::rename(&original, &backup).await.map_err(|e| {
                EngineError::io(format!("Failed to back up {}", original.display()), e)
            })?;
            debug!("Backed up {} to {}", original.display(), backup.display());
            backups.push(backup);
        }
        Ok(backups)
    }

    /// Moves the aligner output to its published name
    pub async fn publish(&self) -> Result<PathBuf> {
        let published = self.published();
        tokio::fs::rename(self.aligned_temp(), &published)
            .await
            .map_err(|e| EngineError::io("Failed to publish aligned subtitle", e))?;
        Ok(published)
    }

    /// Backups currently present in the directory
    pub async fn collect_backups(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for (_, backup) in self.backup_pairs() {
            if tokio::fs::try_exists(&backup).await.unwrap_or(false) {
                found.push(backup);
            }
        }
        found
    }

    /// Deletes the whole job directory; a missing directory is not an error
    pub async fn remove(&self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => info!("Removed workspace {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.dir.display(), e),
        }
    }
}

/// Lower-cased extension of `path` including the leading dot, or ""
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Stem used to name outputs, falling back to "video"
///
/// Stems that collide with the intermediate files get a `_video` suffix.
pub fn sanitize_basename(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "video".to_string());

    if [NORMALIZED_STEM, ALIGNED_STEM]
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return format!("{}_video", stem);
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn staged(root: &Path, subtitle_name: &str, force_sami: bool) -> JobWorkspace {
        let sources = root.join("sources");
        std::fs::create_dir_all(&sources).unwrap();
        let video = sources.join("Movie.MP4");
        let subtitle = sources.join(subtitle_name);
        std::fs::write(&video, b"v").unwrap();
        std::fs::write(&subtitle, "1\n00:00:01,000 --> 00:00:02,000\nhi\n").unwrap();

        let inputs = JobInputs::new(&video, &subtitle).force_sami(force_sami);
        JobWorkspace::stage(&root.join("jobs"), Uuid::new_v4(), "Movie", &inputs)
            .await
            .expect("staging should succeed")
    }

    #[test]
    fn test_sanitize_basename() {
        assert_eq!(sanitize_basename("clip.mp4"), "clip");
        assert_eq!(sanitize_basename("my.movie.mkv"), "my.movie");
        assert_eq!(sanitize_basename(""), "video");
    }

    #[tokio::test]
    async fn test_reserved_stems_do_not_collide_with_intermediates() {
        assert_eq!(sanitize_basename("normalized_sub.mkv"), "normalized_sub_video");
        assert_eq!(sanitize_basename("Aligned_Temp.mp4"), "Aligned_Temp_video");

        let root = tempfile::tempdir().unwrap();
        let sources = root.path().join("sources");
        std::fs::create_dir(&sources).unwrap();
        std::fs::write(sources.join("v.mkv"), b"v").unwrap();
        std::fs::write(sources.join("s.srt"), "subtitle").unwrap();
        let inputs = JobInputs::new(sources.join("v.mkv"), sources.join("s.srt"))
            .with_video_name("normalized_sub.mkv");

        let basename = sanitize_basename("normalized_sub.mkv");
        let jobs = root.path().join("jobs");
        let workspace = JobWorkspace::stage(&jobs, Uuid::new_v4(), &basename, &inputs)
            .await
            .unwrap();
        assert_ne!(workspace.subtitle(), workspace.normalized().as_path());

        // Backing up the staged subtitle leaves the normalizer output alone.
        std::fs::write(workspace.normalized(), "normalized").unwrap();
        workspace.backup_existing().await.unwrap();
        assert!(workspace.normalized().exists());
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("a/b/C.SRT")), ".srt");
        assert_eq!(dotted_extension(Path::new("noext")), "");
    }

    #[tokio::test]
    async fn test_stage_copies_inputs() {
        let root = tempfile::tempdir().unwrap();
        let workspace = staged(root.path(), "subs.srt", false).await;

        assert!(workspace.dir().starts_with(root.path().join("jobs")));
        assert_eq!(
            workspace.video().file_name().unwrap(),
            "original_video.mp4"
        );
        assert_eq!(workspace.subtitle().file_name().unwrap(), "Movie.srt");
        assert!(workspace.verify_inputs().await.is_ok());
    }

    #[tokio::test]
    async fn test_force_sami_changes_extension() {
        let root = tempfile::tempdir().unwrap();
        let workspace = staged(root.path(), "subs.srt", true).await;
        assert_eq!(workspace.subtitle().file_name().unwrap(), "Movie.smi");
    }

    #[tokio::test]
    async fn test_failed_staging_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let jobs = root.path().join("jobs");
        let inputs = JobInputs::new(
            root.path().join("missing.mp4"),
            root.path().join("missing.srt"),
        );

        let result = JobWorkspace::stage(&jobs, Uuid::new_v4(), "missing", &inputs).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(&jobs).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_backup_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let workspace = staged(root.path(), "subs.srt", false).await;

        let first = workspace.backup_existing().await.unwrap();
        assert_eq!(first, vec![workspace.dir().join("Movie.srt.bk")]);
        assert!(!workspace.subtitle().exists());

        let second = workspace.backup_existing().await.unwrap();
        assert!(second.is_empty());

        // A new same-named file replaces the previous backup.
        std::fs::write(workspace.dir().join("Movie.srt"), "newer").unwrap();
        workspace.backup_existing().await.unwrap();
        let backup = std::fs::read_to_string(workspace.dir().join("Movie.srt.bk")).unwrap();
        assert_eq!(backup, "newer");
        assert_eq!(workspace.collect_backups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_moves_aligned_output() {
        let root = tempfile::tempdir().unwrap();
        let workspace = staged(root.path(), "subs.ass", false).await;

        assert!(workspace.publish().await.is_err());

        std::fs::write(workspace.aligned_temp(), "ALIGNED").unwrap();
        let published = workspace.publish().await.unwrap();
        assert_eq!(published, workspace.dir().join("Movie.srt"));
        assert!(!workspace.aligned_temp().exists());
        assert_eq!(std::fs::read_to_string(published).unwrap(), "ALIGNED");
    }

    #[tokio::test]
    async fn test_remove_twice_is_harmless() {
        let root = tempfile::tempdir().unwrap();
        let workspace = staged(root.path(), "subs.srt", false).await;
        workspace.remove().await;
        workspace.remove().await;
        assert!(!workspace.dir().exists());
    }
}
