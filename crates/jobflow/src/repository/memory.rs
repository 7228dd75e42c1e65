//! Volatile repository backend.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use super::{
    validate_cleanup, JobRepository, JobUpdate, LifecycleGuard, OrderBy, RepositoryError,
};
use crate::model::{JobRecord, JobStatus};

/// Keeps every record in a `RwLock<HashMap>`. Contents are lost on drop.
pub struct InMemoryJobRepository {
    lifecycle: LifecycleGuard,
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self {
            lifecycle: LifecycleGuard::new(),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Clones matching records, then sorts and paginates them.
    fn select<F>(
        &self,
        filter: F,
        order_by: OrderBy,
        descending: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<JobRecord>, RepositoryError>
    where
        F: Fn(&JobRecord) -> bool,
    {
        self.lifecycle.ensure_open()?;
        let jobs = self.jobs.read().map_err(|_| RepositoryError::LockPoisoned)?;

        let mut selected: Vec<JobRecord> = jobs.values().filter(|r| filter(r)).cloned().collect();
        selected.sort_by(|a, b| {
            let ordering = order_by
                .key(a)
                .cmp(&order_by.key(b))
                .then_with(|| a.job_id.cmp(&b.job_id));
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(selected
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }
}

impl Default for InMemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn initialize(&self) -> Result<(), RepositoryError> {
        if self.lifecycle.open()? {
            log::debug!("In-memory job repository initialized");
        }
        Ok(())
    }

    fn close(&self) -> Result<(), RepositoryError> {
        self.lifecycle.close()
    }

    fn create(&self, record: &JobRecord) -> Result<(), RepositoryError> {
        self.lifecycle.ensure_open()?;
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        if jobs.contains_key(&record.job_id) {
            return Err(RepositoryError::Duplicate(record.job_id.clone()));
        }
        jobs.insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, job_id: &str) -> Result<Option<JobRecord>, RepositoryError> {
        self.lifecycle.ensure_open()?;
        let jobs = self.jobs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(jobs.get(job_id).cloned())
    }

    fn update(&self, job_id: &str, update: &JobUpdate) -> Result<JobRecord, RepositoryError> {
        self.lifecycle.ensure_open()?;
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| RepositoryError::NotFound(job_id.to_string()))?;
        update.apply_to(record, Utc::now())?;
        Ok(record.clone())
    }

    fn delete(&self, job_id: &str) -> Result<bool, RepositoryError> {
        self.lifecycle.ensure_open()?;
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(jobs.remove(job_id).is_some())
    }

    fn get_pending(&self) -> Result<Vec<JobRecord>, RepositoryError> {
        self.select(
            |r| r.status == JobStatus::Pending,
            OrderBy::CreatedAt,
            true,
            None,
            0,
        )
    }

    fn get_by_status(
        &self,
        status: JobStatus,
        limit: usize,
        offset: usize,
        order_by: OrderBy,
        descending: bool,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        self.select(|r| r.status == status, order_by, descending, Some(limit), offset)
    }

    fn get_all(&self, limit: usize, offset: usize) -> Result<Vec<JobRecord>, RepositoryError> {
        self.select(|_| true, OrderBy::CreatedAt, true, Some(limit), offset)
    }

    fn get_history(
        &self,
        limit: usize,
        statuses: Option<&[JobStatus]>,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        self.select(
            |r| statuses.map_or(true, |s| s.contains(&r.status)),
            OrderBy::UpdatedAt,
            true,
            Some(limit),
            0,
        )
    }

    fn find_by_application_url(&self, url: &str) -> Result<Option<JobRecord>, RepositoryError> {
        self.lifecycle.ensure_open()?;
        let jobs = self.jobs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(jobs
            .values()
            .filter(|r| r.application_url.as_deref() == Some(url))
            .max_by(|a, b| match a.created_at.cmp(&b.created_at) {
                Ordering::Equal => a.job_id.cmp(&b.job_id),
                other => other,
            })
            .cloned())
    }

    fn cleanup(
        &self,
        older_than_days: u32,
        statuses: &[JobStatus],
    ) -> Result<usize, RepositoryError> {
        let cutoff = validate_cleanup(older_than_days, statuses)?;
        self.lifecycle.ensure_open()?;
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::LockPoisoned)?;

        let before = jobs.len();
        jobs.retain(|_, r| !(r.created_at < cutoff && statuses.contains(&r.status)));
        let deleted = before - jobs.len();

        log::info!(
            "Cleanup removed {} job(s) older than {} day(s)",
            deleted,
            older_than_days
        );
        Ok(deleted)
    }
}
