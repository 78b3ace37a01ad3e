//! Expiration reaper
//!
//! Bounds the lifetime of job workspaces and registry entries. It runs:
//! - once at startup, over the whole workspace root
//! - opportunistically before every submission
//! - once per job, a TTL after the job concludes: the registry entry is
//!   dropped and, if the job directory is still there, a full sweep follows
//!
//! Sweeps look only at directory modification times, never at the registry,
//! so the per-job removal and the sweep may happen in either order. While a
//! job's pipeline runs, its directory is touched well within every TTL, so
//! only concluded jobs can ever look expired.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::JobRegistry;

/// Deletes every child directory of `root` whose age is at least `ttl`
///
/// Best-effort: entries that vanish mid-sweep (e.g. removed by a concurrent
/// sweep) are skipped silently. Blocking; returns the reclaimed directories.
pub fn sweep(root: &Path, ttl: Duration) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return removed,
        Err(e) => {
            warn!("Failed to read workspace root {}: {}", root.display(), e);
            return removed;
        }
    };

    let now = SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if !metadata.is_dir() {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < ttl {
            continue;
        }

        match std::fs::remove_dir_all(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to reclaim {}: {}", path.display(), e);
                continue;
            }
        }
        debug!("Reclaimed {} (age {:?})", path.display(), age);
        removed.push(path);
    }

    removed
}

/// Resets the modification time of `dir` to now
fn touch(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.set_modified(SystemTime::now())
}

/// Signals that a job's pipeline has concluded
///
/// Firing starts the job's TTL countdown. A trigger is consumed by `fire`,
/// so a job can start its countdown at most once; dropping an unfired
/// trigger starts it as well.
#[derive(Debug)]
pub struct ExpiryTrigger {
    job_id: Uuid,
    tx: oneshot::Sender<()>,
}

impl ExpiryTrigger {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn fire(self) {
        debug!("Expiry countdown started for job {}", self.job_id);
        let _ = self.tx.send(());
    }
}

/// Reclaims expired workspaces and registry entries
#[derive(Clone)]
pub struct ExpirationReaper {
    registry: Arc<JobRegistry>,
    root: PathBuf,
    ttl: Duration,
}

impl ExpirationReaper {
    /// Creates a reaper for the given registry and workspace root
    pub fn new(registry: Arc<JobRegistry>, root: PathBuf, ttl: Duration) -> Self {
        Self {
            registry,
            root,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sweeps the workspace root on a blocking thread
    pub async fn sweep_now(&self) -> Vec<PathBuf> {
        let root = self.root.clone();
        let ttl = self.ttl;

        match tokio::task::spawn_blocking(move || sweep(&root, ttl)).await {
            Ok(removed) => {
                if !removed.is_empty() {
                    info!("Reclaimed {} expired job workspace(s)", removed.len());
                }
                removed
            }
            Err(e) => {
                warn!("Workspace sweep did not complete: {}", e);
                Vec::new()
            }
        }
    }

    /// Prepares the deferred expiry of one job
    ///
    /// Returns the trigger the executor fires when the pipeline concludes,
    /// and the handle of the task behind it. Until the trigger fires, the
    /// task keeps `job_dir` fresh so no sweep reclaims a running job. Then
    /// it sleeps for the TTL, drops the registry entry, and sweeps again if
    /// `job_dir` still exists.
    pub fn arm(&self, job_id: Uuid, job_dir: PathBuf) -> (ExpiryTrigger, JoinHandle<()>) {
        let (tx, mut rx) = oneshot::channel::<()>();
        let reaper = self.clone();
        let heartbeat = (self.ttl / 4).max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // An error means the trigger was dropped unfired; the job is over either way.
                    _ = &mut rx => break,
                    _ = tokio::time::sleep(heartbeat) => reaper.keep_fresh(&job_dir).await,
                }
            }
            tokio::time::sleep(reaper.ttl).await;

            if reaper.registry.remove(job_id) {
                info!("Job {} expired", job_id);
            }

            if tokio::fs::try_exists(&job_dir).await.unwrap_or(false) {
                reaper.sweep_now().await;
            }
        });

        (ExpiryTrigger { job_id, tx }, handle)
    }

    async fn keep_fresh(&self, job_dir: &Path) {
        let dir = job_dir.to_path_buf();
        match tokio::task::spawn_blocking(move || touch(&dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Ok(Err(e)) => warn!("Failed to refresh {}: {}", job_dir.display(), e),
            Err(e) => warn!("Refresh of {} did not complete: {}", job_dir.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};
    use subsync_core::domain::job::JobState;

    fn age_dir(path: &Path, age: Duration) {
        let past = SystemTime::now() - age;
        let dir = File::open(path).unwrap();
        dir.set_times(FileTimes::new().set_accessed(past).set_modified(past))
            .unwrap();
    }

    #[test]
    fn test_sweep_removes_only_expired_directories() {
        let base = tempfile::tempdir().unwrap();
        let fresh = base.path().join("fresh");
        let old = base.path().join("old");
        std::fs::create_dir(&fresh).unwrap();
        std::fs::create_dir(&old).unwrap();
        std::fs::write(old.join("file.txt"), "data").unwrap();
        std::fs::write(base.path().join("stray.txt"), "not a job").unwrap();
        age_dir(&old, Duration::from_secs(7200));

        let removed = sweep(base.path(), Duration::from_secs(3600));

        assert_eq!(removed, vec![old.clone()]);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(base.path().join("stray.txt").exists());
    }

    #[test]
    fn test_sweep_of_missing_root_is_empty() {
        let base = tempfile::tempdir().unwrap();
        assert!(sweep(&base.path().join("absent"), Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_concurrent_sweeps_are_safe() {
        let base = tempfile::tempdir().unwrap();
        for i in 0..16 {
            let dir = base.path().join(format!("job-{}", i));
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("data"), "x").unwrap();
            age_dir(&dir, Duration::from_secs(600));
        }

        let root = base.path().to_path_buf();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || sweep(&root, Duration::from_secs(60)))
            })
            .collect();
        for handle in handles {
            handle.join().expect("sweep must not panic");
        }

        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_armed_expiry_waits_for_trigger_then_ttl() {
        let base = tempfile::tempdir().unwrap();
        let registry = Arc::new(JobRegistry::new());
        let reaper = ExpirationReaper::new(
            Arc::clone(&registry),
            base.path().to_path_buf(),
            Duration::from_millis(200),
        );

        let id = Uuid::new_v4();
        let job_dir = base.path().join(id.simple().to_string());
        std::fs::create_dir(&job_dir).unwrap();
        registry.register(JobState::queued(id, "clip")).unwrap();

        let (trigger, handle) = reaper.arm(id, job_dir.clone());

        // Not fired yet: nothing may be reclaimed.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registry.get(id).is_ok());
        assert!(job_dir.exists());

        trigger.fire();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.get(id).is_ok());

        handle.await.unwrap();
        assert!(registry.get(id).unwrap_err().is_not_found());
        assert!(!job_dir.exists());
    }

    #[tokio::test]
    async fn test_armed_job_is_never_swept_before_trigger() {
        let base = tempfile::tempdir().unwrap();
        let ttl = Duration::from_millis(200);
        let reaper = ExpirationReaper::new(
            Arc::new(JobRegistry::new()),
            base.path().to_path_buf(),
            ttl,
        );

        let job_dir = base.path().join("running");
        std::fs::create_dir(&job_dir).unwrap();
        let (trigger, handle) = reaper.arm(Uuid::new_v4(), job_dir.clone());

        // Several TTLs pass without anything written into the directory.
        for _ in 0..4 {
            tokio::time::sleep(ttl).await;
            assert!(reaper.sweep_now().await.is_empty());
            assert!(job_dir.exists());
        }

        trigger.fire();
        handle.await.unwrap();
        assert!(!job_dir.exists());
    }

    #[test]
    fn test_touch_resets_age() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("job");
        std::fs::create_dir(&dir).unwrap();
        age_dir(&dir, Duration::from_secs(7200));

        touch(&dir).unwrap();
        assert!(sweep(base.path(), Duration::from_secs(3600)).is_empty());
        assert!(touch(&base.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_dropped_trigger_still_expires() {
        let base = tempfile::tempdir().unwrap();
        let registry = Arc::new(JobRegistry::new());
        let reaper = ExpirationReaper::new(
            Arc::clone(&registry),
            base.path().to_path_buf(),
            Duration::from_millis(50),
        );

        let id = Uuid::new_v4();
        registry.register(JobState::queued(id, "clip")).unwrap();
        let (trigger, handle) = reaper.arm(id, base.path().join("gone"));
        drop(trigger);

        handle.await.unwrap();
        assert!(registry.is_empty());
    }
}
