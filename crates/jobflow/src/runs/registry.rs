//! Run registry: which run last touched each job.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{JobRecord, JobStatus};
use crate::repository::{JobRepository, RepositoryError};
use crate::workflows::WorkflowKind;

/// Page size used when rebuilding from the repository.
const REBUILD_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunEntry {
    pub run_id: String,
    pub job_id: String,
    pub kind: WorkflowKind,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Reconstructed from the repository; no live snapshot exists.
    #[serde(default)]
    pub recovered: bool,
}

impl RunEntry {
    pub fn is_active(&self) -> bool {
        self.finished_at.is_none()
    }

    fn recovered_from(record: &JobRecord) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            job_id: record.job_id.clone(),
            kind: kind_for_record(record),
            started_at: record.updated_at,
            finished_at: Some(record.updated_at),
            recovered: true,
        }
    }
}

/// The workflow that most plausibly produced a record at rest.
pub fn kind_for_record(record: &JobRecord) -> WorkflowKind {
    match record.status {
        JobStatus::Applied | JobStatus::ManualRequired => WorkflowKind::Application,
        _ if record.retry_count > 0 => WorkflowKind::Retry,
        _ => WorkflowKind::Preparation,
    }
}

/// A run reserved by [`RunRegistry::try_register`], with the entry it
/// displaced so the reservation can be withdrawn.
#[derive(Debug, Clone)]
pub struct Registration {
    pub entry: RunEntry,
    pub previous: Option<RunEntry>,
}

/// Maps job id to its latest run.
pub struct RunRegistry {
    runs: RwLock<HashMap<String, RunEntry>>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RunEntry>> {
        match self.runs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Run registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RunEntry>> {
        match self.runs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Run registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn fresh_entry(job_id: &str, kind: WorkflowKind) -> RunEntry {
        RunEntry {
            run_id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            recovered: false,
        }
    }

    /// Records a new run for `job_id`, replacing any previous entry.
    pub fn register(&self, job_id: &str, kind: WorkflowKind) -> RunEntry {
        let entry = Self::fresh_entry(job_id, kind);
        self.write().insert(job_id.to_string(), entry.clone());
        log::debug!("Registered {} run {} for job {}", kind, entry.run_id, job_id);
        entry
    }

    /// Reserves a run for `job_id` unless one is still active.
    ///
    /// The check and the insert happen under one write lock, so of two
    /// concurrent callers exactly one wins. The loser gets the active entry.
    pub fn try_register(&self, job_id: &str, kind: WorkflowKind) -> Result<Registration, RunEntry> {
        let mut runs = self.write();
        if let Some(active) = runs.get(job_id).filter(|entry| entry.is_active()) {
            return Err(active.clone());
        }
        let entry = Self::fresh_entry(job_id, kind);
        let previous = runs.insert(job_id.to_string(), entry.clone());
        drop(runs);
        log::debug!("Reserved {} run {} for job {}", kind, entry.run_id, job_id);
        Ok(Registration { entry, previous })
    }

    /// Withdraws a reservation that never ran, restoring the entry it
    /// displaced. Ignored if a newer run replaced it.
    pub fn cancel(&self, registration: Registration) {
        let Registration { entry, previous } = registration;
        let mut runs = self.write();
        if runs.get(&entry.job_id).map(|current| current.run_id.as_str()) != Some(entry.run_id.as_str()) {
            return;
        }
        match previous {
            Some(previous) => runs.insert(entry.job_id.clone(), previous),
            None => runs.remove(&entry.job_id),
        };
        log::debug!("Withdrew run {} for job {}", entry.run_id, entry.job_id);
    }

    /// Marks a run finished. Ignored if a newer run replaced it.
    pub fn mark_finished(&self, job_id: &str, run_id: &str) {
        if let Some(entry) = self.write().get_mut(job_id) {
            if entry.run_id == run_id {
                entry.finished_at = Some(Utc::now());
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<RunEntry> {
        self.read().get(job_id).cloned()
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.read().get(job_id).is_some_and(RunEntry::is_active)
    }

    pub fn remove(&self, job_id: &str) -> Option<RunEntry> {
        self.write().remove(job_id)
    }

    /// Drops finished entries whose job is gone from `repository`.
    /// Returns the removed entries.
    pub fn sweep_orphans(&self, repository: &dyn JobRepository) -> Result<Vec<RunEntry>, RepositoryError> {
        let finished: Vec<String> = self
            .read()
            .values()
            .filter(|entry| !entry.is_active())
            .map(|entry| entry.job_id.clone())
            .collect();

        let mut removed = Vec::new();
        for job_id in finished {
            if repository.get(&job_id)?.is_some() {
                continue;
            }
            let mut runs = self.write();
            if runs.get(&job_id).is_some_and(|entry| !entry.is_active()) {
                if let Some(entry) = runs.remove(&job_id) {
                    removed.push(entry);
                }
            }
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Recreates entries for every stored job that has none, e.g. after a
    /// restart. Returns the number of entries added.
    pub fn rebuild(&self, repository: &dyn JobRepository) -> Result<usize, RepositoryError> {
        let mut added = 0;
        let mut offset = 0;
        loop {
            let page = repository.get_all(REBUILD_PAGE_SIZE, offset)?;
            let fetched = page.len();

            let mut runs = self.write();
            for record in &page {
                if !runs.contains_key(&record.job_id) {
                    runs.insert(record.job_id.clone(), RunEntry::recovered_from(record));
                    added += 1;
                }
            }
            drop(runs);

            if fetched < REBUILD_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }
        log::info!("Run registry rebuilt: {} entries recovered", added);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobMode, JobSource};
    use crate::repository::InMemoryJobRepository;

    fn record(job_id: &str, status: JobStatus, retry_count: u32) -> JobRecord {
        let mut record = JobRecord::new(job_id, JobSource::Manual, JobMode::Full);
        record.status = status;
        record.retry_count = retry_count;
        record
    }

    #[test]
    fn test_register_and_finish() {
        let registry = RunRegistry::new();
        let first = registry.register("job-1", WorkflowKind::Preparation);
        assert!(registry.is_active("job-1"));

        let second = registry.register("job-1", WorkflowKind::Retry);
        registry.mark_finished("job-1", &first.run_id);
        assert!(registry.is_active("job-1"), "stale run must not finish the new one");

        registry.mark_finished("job-1", &second.run_id);
        assert!(!registry.is_active("job-1"));
        assert_eq!(registry.get("job-1").unwrap().kind, WorkflowKind::Retry);
    }

    #[test]
    fn test_try_register_refuses_active_run() {
        let registry = RunRegistry::new();
        let first = registry.try_register("job-1", WorkflowKind::Retry).unwrap();
        assert!(first.previous.is_none());

        let active = registry.try_register("job-1", WorkflowKind::Application).unwrap_err();
        assert_eq!(active.run_id, first.entry.run_id);

        registry.mark_finished("job-1", &first.entry.run_id);
        let second = registry.try_register("job-1", WorkflowKind::Application).unwrap();
        assert_eq!(second.previous.unwrap().run_id, first.entry.run_id);
    }

    #[test]
    fn test_try_register_single_winner() {
        use std::sync::{Arc, Barrier};

        let registry = Arc::new(RunRegistry::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.try_register("job-1", WorkflowKind::Retry).is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_cancel_restores_previous() {
        let registry = RunRegistry::new();
        let first = registry.register("job-1", WorkflowKind::Preparation);
        registry.mark_finished("job-1", &first.run_id);

        let reserved = registry.try_register("job-1", WorkflowKind::Retry).unwrap();
        registry.cancel(reserved);
        let restored = registry.get("job-1").unwrap();
        assert_eq!(restored.run_id, first.run_id);
        assert!(!restored.is_active());

        let fresh = registry.try_register("job-2", WorkflowKind::Retry).unwrap();
        registry.cancel(fresh);
        assert!(registry.get("job-2").is_none());
    }

    #[test]
    fn test_sweep_orphans() {
        let repo = InMemoryJobRepository::new();
        repo.initialize().unwrap();
        repo.create(&record("kept", JobStatus::Completed, 0)).unwrap();

        let registry = RunRegistry::new();
        for job_id in ["kept", "gone", "busy"] {
            registry.register(job_id, WorkflowKind::Preparation);
        }
        for job_id in ["kept", "gone"] {
            let run_id = registry.get(job_id).unwrap().run_id;
            registry.mark_finished(job_id, &run_id);
        }

        let removed = registry.sweep_orphans(&repo).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].job_id, "gone");
        assert!(registry.get("kept").is_some());
        assert!(registry.is_active("busy"));
    }

    #[test]
    fn test_kind_from_status() {
        assert_eq!(
            kind_for_record(&record("a", JobStatus::Applied, 2)),
            WorkflowKind::Application
        );
        assert_eq!(
            kind_for_record(&record("b", JobStatus::ManualRequired, 0)),
            WorkflowKind::Application
        );
        assert_eq!(
            kind_for_record(&record("c", JobStatus::Pending, 1)),
            WorkflowKind::Retry
        );
        assert_eq!(
            kind_for_record(&record("d", JobStatus::Declined, 0)),
            WorkflowKind::Preparation
        );
    }

    #[test]
    fn test_rebuild_keeps_live_entries() {
        let repo = InMemoryJobRepository::new();
        repo.initialize().unwrap();
        repo.create(&record("job-1", JobStatus::Pending, 0)).unwrap();
        repo.create(&record("job-2", JobStatus::Applied, 0)).unwrap();

        let registry = RunRegistry::new();
        let live = registry.register("job-1", WorkflowKind::Retry);

        assert_eq!(registry.rebuild(&repo).unwrap(), 1);
        assert_eq!(registry.get("job-1").unwrap().run_id, live.run_id);

        let recovered = registry.get("job-2").unwrap();
        assert!(recovered.recovered);
        assert!(!recovered.is_active());
        assert_eq!(recovered.kind, WorkflowKind::Application);
    }
}
