//! Job registry
//!
//! In-memory store mapping job ids to their current state. Every operation
//! takes a single registry-wide lock for the duration of the map mutation
//! only; no I/O happens while it is held. Readers always get a cloned
//! snapshot, never a live reference.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use subsync_core::domain::artifact::Artifact;
use subsync_core::domain::job::{JobState, JobStatus};
use subsync_core::domain::log::{CommandResult, ProgressEvent, StepLog};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// A set of field changes merged atomically into a job
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub current_step: Option<String>,
    pub message: Option<String>,
    pub detected_encoding: Option<String>,
    pub artifacts: Option<Vec<Artifact>>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn detected_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.detected_encoding = Some(encoding.into());
        self
    }

    pub fn artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Checks the update against the current state without touching it
    fn check(&self, job: &JobState) -> std::result::Result<(), String> {
        if job.status.is_terminal() {
            return Err(format!("job already {}", job.status));
        }

        if let Some(next) = self.status {
            if !job.status.can_advance_to(next) {
                return Err(format!("status cannot move from {} to {}", job.status, next));
            }
        }

        if let Some(progress) = self.progress {
            if !(0.0..=1.0).contains(&progress) {
                return Err(format!("progress {} outside [0, 1]", progress));
            }
            if progress < job.progress {
                return Err(format!(
                    "progress cannot decrease from {} to {}",
                    job.progress, progress
                ));
            }
        }

        if self.detected_encoding.is_some() && job.detected_encoding.is_some() {
            return Err("detected encoding is already set".to_string());
        }

        if self.error_message.is_some() && self.status != Some(JobStatus::Failed) {
            return Err("error message is only recorded when failing the job".to_string());
        }

        Ok(())
    }

    fn apply(self, job: &mut JobState) {
        let touches_timeline =
            self.progress.is_some() || self.current_step.is_some() || self.message.is_some();

        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(step) = self.current_step {
            job.current_step = step;
        }
        if let Some(message) = self.message {
            job.message = message;
        }
        if let Some(encoding) = self.detected_encoding {
            job.detected_encoding = Some(encoding);
        }
        if let Some(artifacts) = self.artifacts {
            job.artifacts = artifacts;
        }
        if let Some(error_message) = self.error_message {
            job.error_message = Some(error_message);
        }

        if touches_timeline {
            job.timeline.push(ProgressEvent {
                at: chrono::Utc::now(),
                step: job.current_step.clone(),
                message: job.message.clone(),
                progress: job.progress,
            });
        }
    }
}

/// Concurrency-safe map of job id to job state
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, JobState>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobState>> {
        // A panic while holding the lock cannot leave a half-applied update:
        // updates are validated before any field is written.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a new job; an existing entry with the same id is never overwritten
    pub fn register(&self, state: JobState) -> Result<()> {
        let mut jobs = self.lock();
        if jobs.contains_key(&state.id) {
            error!("Refusing to register duplicate job {}", state.id);
            return Err(EngineError::DuplicateJob(state.id));
        }
        debug!("Registered job {}", state.id);
        jobs.insert(state.id, state);
        Ok(())
    }

    /// Atomically merges `update` into the job
    ///
    /// Backward status moves, decreasing progress, a second encoding, and any
    /// change to a concluded job are rejected with `InvalidTransition`.
    pub fn apply_update(&self, id: Uuid, update: JobUpdate) -> Result<()> {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&id).ok_or(EngineError::NotFound(id))?;

        if let Err(reason) = update.check(job) {
            error!("Rejected update for job {}: {}", id, reason);
            return Err(EngineError::InvalidTransition { job_id: id, reason });
        }

        update.apply(job);
        Ok(())
    }

    /// Appends one step result to the job's log
    ///
    /// Accepted even after the job has concluded; only status and progress
    /// are frozen at that point.
    pub fn append_log(
        &self,
        id: Uuid,
        step: impl Into<String>,
        result: CommandResult,
    ) -> Result<()> {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        job.logs.push(StepLog {
            step: step.into(),
            result,
        });
        Ok(())
    }

    /// Returns a snapshot of the job's current state
    pub fn get(&self, id: Uuid) -> Result<JobState> {
        self.lock().get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Deletes the job; removing an absent id is not an error
    ///
    /// Returns whether an entry was actually removed.
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!("Removed job {} from registry", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry_with_job() -> (JobRegistry, Uuid) {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        registry.register(JobState::queued(id, "clip")).unwrap();
        (registry, id)
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let (registry, id) = registry_with_job();
        let err = registry.register(JobState::queued(id, "other")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateJob(dup) if dup == id));
        assert_eq!(registry.get(id).unwrap().video_basename, "clip");
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        assert!(registry.get(id).unwrap_err().is_not_found());
        assert!(
            registry
                .apply_update(id, JobUpdate::new().progress(0.1))
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            registry
                .append_log(id, "uchardet", CommandResult::new(vec![], "", ""))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_apply_update_merges_fields_and_records_timeline() {
        let (registry, id) = registry_with_job();
        registry
            .apply_update(
                id,
                JobUpdate::new()
                    .status(JobStatus::Running)
                    .progress(0.1)
                    .step("Preparing inputs")
                    .message("Inputs staged"),
            )
            .unwrap();

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 0.1);
        assert_eq!(job.current_step, "Preparing inputs");
        assert_eq!(job.timeline.len(), 1);
        assert_eq!(job.timeline[0].message, "Inputs staged");
    }

    #[test]
    fn test_backward_status_is_rejected() {
        let (registry, id) = registry_with_job();
        registry
            .apply_update(id, JobUpdate::new().status(JobStatus::Running))
            .unwrap();

        let err = registry
            .apply_update(id, JobUpdate::new().status(JobStatus::Queued))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn test_progress_never_decreases() {
        let (registry, id) = registry_with_job();
        registry
            .apply_update(id, JobUpdate::new().progress(0.45))
            .unwrap();
        assert!(
            registry
                .apply_update(id, JobUpdate::new().progress(0.25))
                .is_err()
        );
        assert!(
            registry
                .apply_update(id, JobUpdate::new().progress(1.5))
                .is_err()
        );
        assert_eq!(registry.get(id).unwrap().progress, 0.45);
    }

    #[test]
    fn test_rejected_update_is_not_partially_applied() {
        let (registry, id) = registry_with_job();
        registry
            .apply_update(id, JobUpdate::new().progress(0.6))
            .unwrap();

        let result = registry.apply_update(
            id,
            JobUpdate::new().message("should not land").progress(0.2),
        );
        assert!(result.is_err());

        let job = registry.get(id).unwrap();
        assert_ne!(job.message, "should not land");
        assert_eq!(job.timeline.len(), 1);
    }

    #[test]
    fn test_detected_encoding_set_once() {
        let (registry, id) = registry_with_job();
        registry
            .apply_update(id, JobUpdate::new().detected_encoding("utf-8"))
            .unwrap();
        assert!(
            registry
                .apply_update(id, JobUpdate::new().detected_encoding("uhc"))
                .is_err()
        );
        assert_eq!(
            registry.get(id).unwrap().detected_encoding.as_deref(),
            Some("utf-8")
        );
    }

    #[test]
    fn test_terminal_state_is_frozen_but_logs_still_append() {
        let (registry, id) = registry_with_job();
        registry
            .apply_update(
                id,
                JobUpdate::new()
                    .status(JobStatus::Failed)
                    .error_message("tool failed"),
            )
            .unwrap();

        assert!(
            registry
                .apply_update(id, JobUpdate::new().progress(1.0))
                .is_err()
        );
        assert!(
            registry
                .apply_update(id, JobUpdate::new().status(JobStatus::Completed))
                .is_err()
        );

        registry
            .append_log(id, "late", CommandResult::new(vec!["echo".into()], "x", ""))
            .unwrap();
        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.logs.len(), 1);
        assert_eq!(job.error_message.as_deref(), Some("tool failed"));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let (registry, id) = registry_with_job();
        let before = registry.get(id).unwrap();
        registry
            .append_log(id, "uchardet", CommandResult::new(vec![], "utf-8", ""))
            .unwrap();
        assert!(before.logs.is_empty());
        assert_eq!(registry.get(id).unwrap().logs.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (registry, id) = registry_with_job();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.get(id).unwrap_err().is_not_found());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_jobs_do_not_interfere() {
        let registry = Arc::new(JobRegistry::new());
        let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            registry.register(JobState::queued(*id, id.to_string())).unwrap();
        }

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let registry = Arc::clone(&registry);
                let id = *id;
                std::thread::spawn(move || {
                    for step in 0..50 {
                        let result = CommandResult::new(vec![], id.to_string(), "");
                        registry
                            .append_log(id, format!("step-{}", step), result)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            let job = registry.get(id).unwrap();
            assert_eq!(job.logs.len(), 50);
            assert!(job.logs.iter().all(|l| l.result.stdout == id.to_string()));
            assert_eq!(job.logs[0].step, "step-0");
            assert_eq!(job.logs[49].step, "step-49");
        }
    }
}
