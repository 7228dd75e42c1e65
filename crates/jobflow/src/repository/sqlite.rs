//! Durable repository backend over the SQLite [`Database`] handle.

use std::path::Path;

use chrono::Utc;

use super::{
    validate_cleanup, JobRepository, JobUpdate, LifecycleGuard, OrderBy, RepositoryError,
};
use crate::db::job_repo::{self, JobQuery, JobRow, SortColumn};
use crate::db::Database;
use crate::model::{JobRecord, JobStatus};

pub struct SqliteJobRepository {
    db: Database,
    lifecycle: LifecycleGuard,
}

impl SqliteJobRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            lifecycle: LifecycleGuard::new(),
        }
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn fetch(&self, query: JobQuery) -> Result<Vec<JobRecord>, RepositoryError> {
        self.lifecycle.ensure_open()?;
        job_repo::query(&self.db, &query)?
            .into_iter()
            .map(|row| row.into_record().map_err(RepositoryError::from))
            .collect()
    }
}

fn sort_column(order_by: OrderBy) -> SortColumn {
    match order_by {
        OrderBy::CreatedAt => SortColumn::CreatedAt,
        OrderBy::UpdatedAt => SortColumn::UpdatedAt,
    }
}

fn status_names(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

impl JobRepository for SqliteJobRepository {
    fn initialize(&self) -> Result<(), RepositoryError> {
        if self.lifecycle.open()? {
            self.db.migrate()?;
            log::info!("SQLite job repository initialized");
        }
        Ok(())
    }

    fn close(&self) -> Result<(), RepositoryError> {
        self.lifecycle.close()
    }

    fn create(&self, record: &JobRecord) -> Result<(), RepositoryError> {
        self.lifecycle.ensure_open()?;
        let row = JobRow::from_record(record)?;
        let inserted = self.db.with_conn(|conn| job_repo::insert_new(conn, &row))?;
        if !inserted {
            return Err(RepositoryError::Duplicate(record.job_id.clone()));
        }
        Ok(())
    }

    fn get(&self, job_id: &str) -> Result<Option<JobRecord>, RepositoryError> {
        self.lifecycle.ensure_open()?;
        match job_repo::find_by_id(&self.db, job_id)? {
            Some(row) => Ok(Some(row.into_record()?)),
            None => Ok(None),
        }
    }

    fn update(&self, job_id: &str, update: &JobUpdate) -> Result<JobRecord, RepositoryError> {
        self.lifecycle.ensure_open()?;
        // Read-modify-write under the connection lock so each call is atomic.
        self.db.with_conn(|conn| {
            let Some(row) = job_repo::select_by_id(conn, job_id)? else {
                return Ok(Err(RepositoryError::NotFound(job_id.to_string())));
            };
            let mut record = row.into_record()?;
            if let Err(e) = update.apply_to(&mut record, Utc::now()) {
                return Ok(Err(e));
            }
            job_repo::overwrite(conn, &JobRow::from_record(&record)?)?;
            Ok(Ok(record))
        })?
    }

    fn delete(&self, job_id: &str) -> Result<bool, RepositoryError> {
        self.lifecycle.ensure_open()?;
        Ok(job_repo::delete(&self.db, job_id)?)
    }

    fn get_pending(&self) -> Result<Vec<JobRecord>, RepositoryError> {
        self.fetch(JobQuery {
            statuses: status_names(&[JobStatus::Pending]),
            order_by: SortColumn::CreatedAt,
            descending: true,
            ..Default::default()
        })
    }

    fn get_by_status(
        &self,
        status: JobStatus,
        limit: usize,
        offset: usize,
        order_by: OrderBy,
        descending: bool,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        self.fetch(JobQuery {
            statuses: status_names(&[status]),
            order_by: sort_column(order_by),
            descending,
            limit: Some(limit as u64),
            offset: offset as u64,
            ..Default::default()
        })
    }

    fn get_all(&self, limit: usize, offset: usize) -> Result<Vec<JobRecord>, RepositoryError> {
        self.fetch(JobQuery {
            order_by: SortColumn::CreatedAt,
            descending: true,
            limit: Some(limit as u64),
            offset: offset as u64,
            ..Default::default()
        })
    }

    fn get_history(
        &self,
        limit: usize,
        statuses: Option<&[JobStatus]>,
    ) -> Result<Vec<JobRecord>, RepositoryError> {
        if statuses.is_some_and(|s| s.is_empty()) {
            return Ok(Vec::new());
        }
        self.fetch(JobQuery {
            statuses: statuses.map(status_names).unwrap_or_default(),
            order_by: SortColumn::UpdatedAt,
            descending: true,
            limit: Some(limit as u64),
            ..Default::default()
        })
    }

    fn find_by_application_url(&self, url: &str) -> Result<Option<JobRecord>, RepositoryError> {
        Ok(self
            .fetch(JobQuery {
                application_url: Some(url.to_string()),
                order_by: SortColumn::CreatedAt,
                descending: true,
                limit: Some(1),
                ..Default::default()
            })?
            .into_iter()
            .next())
    }

    fn cleanup(
        &self,
        older_than_days: u32,
        statuses: &[JobStatus],
    ) -> Result<usize, RepositoryError> {
        let cutoff = validate_cleanup(older_than_days, statuses)?;
        self.lifecycle.ensure_open()?;
        let deleted = job_repo::delete_older_than(&self.db, &cutoff, &status_names(statuses))?;
        log::info!(
            "Cleanup removed {} job(s) older than {} day(s)",
            deleted,
            older_than_days
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobMode, JobSource};

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let mut record = JobRecord::new("persisted", JobSource::Manual, JobMode::Full);
        record.status = JobStatus::Pending;

        {
            let repo = SqliteJobRepository::open(&path).unwrap();
            repo.initialize().unwrap();
            repo.create(&record).unwrap();
            repo.close().unwrap();
        }

        let repo = SqliteJobRepository::open(&path).unwrap();
        repo.initialize().unwrap();
        assert_eq!(repo.get("persisted").unwrap(), Some(record));
    }

    #[test]
    fn test_update_rejected_patch_leaves_row_untouched() {
        let repo = SqliteJobRepository::open_in_memory().unwrap();
        repo.initialize().unwrap();
        let mut record = JobRecord::new("job", JobSource::Manual, JobMode::Full);
        record.retry_count = 2;
        repo.create(&record).unwrap();

        let err = repo
            .update(
                "job",
                &JobUpdate::new().status(JobStatus::Failed).retry_count(0),
            )
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidValue { .. }));
        assert_eq!(repo.get("job").unwrap(), Some(record));
    }

    #[test]
    fn test_get_history_with_empty_filter() {
        let repo = SqliteJobRepository::open_in_memory().unwrap();
        repo.initialize().unwrap();
        repo.create(&JobRecord::new("job", JobSource::Manual, JobMode::Mvp))
            .unwrap();
        assert!(repo.get_history(10, Some(&[])).unwrap().is_empty());
        assert_eq!(repo.get_history(10, None).unwrap().len(), 1);
    }
}
