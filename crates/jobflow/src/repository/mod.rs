//! Job repository contract and its backends.
//!
//! Two interchangeable implementations exist: [`InMemoryJobRepository`] for
//! volatile use and tests, and [`SqliteJobRepository`] on top of the
//! [`Database`](crate::db::Database) handle for durable storage. Both are
//! injected into the graphs as `Arc<dyn JobRepository>`.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;

use crate::model::{
    ApplicationResult, ApplicationType, Document, JobMode, JobPosting, JobRecord, JobSource,
    JobStatus, RawInput,
};

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::RepositoryError;
pub use memory::InMemoryJobRepository;
pub use sqlite::SqliteJobRepository;

/// Timestamp column used to order query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl OrderBy {
    fn key(&self, record: &JobRecord) -> DateTime<Utc> {
        match self {
            OrderBy::CreatedAt => record.created_at,
            OrderBy::UpdatedAt => record.updated_at,
        }
    }
}

pub trait JobRepository: Send + Sync {
    /// Prepares the backend. Idempotent; must run before any other call.
    fn initialize(&self) -> Result<(), RepositoryError>;

    /// Releases the backend. Every later call fails with `Closed`.
    fn close(&self) -> Result<(), RepositoryError>;

    /// Stores a new record. Fails with `Duplicate` if the id is taken.
    fn create(&self, record: &JobRecord) -> Result<(), RepositoryError>;

    fn get(&self, job_id: &str) -> Result<Option<JobRecord>, RepositoryError>;

    /// Applies a field patch and stamps `updated_at`. Returns the stored record.
    fn update(&self, job_id: &str, update: &JobUpdate) -> Result<JobRecord, RepositoryError>;

    /// Returns whether a record was removed.
    fn delete(&self, job_id: &str) -> Result<bool, RepositoryError>;

    /// All records awaiting review, newest first.
    fn get_pending(&self) -> Result<Vec<JobRecord>, RepositoryError>;

    fn get_by_status(
        &self,
        status: JobStatus,
        limit: usize,
        offset: usize,
        order_by: OrderBy,
        descending: bool,
    ) -> Result<Vec<JobRecord>, RepositoryError>;

    /// All records, newest first.
    fn get_all(&self, limit: usize, offset: usize) -> Result<Vec<JobRecord>, RepositoryError>;

    /// Recently touched records, most recently updated first.
    fn get_history(
        &self,
        limit: usize,
        statuses: Option<&[JobStatus]>,
    ) -> Result<Vec<JobRecord>, RepositoryError>;

    /// The most recently created record with this application URL.
    fn find_by_application_url(&self, url: &str) -> Result<Option<JobRecord>, RepositoryError>;

    /// Deletes records older than `older_than_days` whose status is in
    /// `statuses`. Returns the number removed.
    fn cleanup(
        &self,
        older_than_days: u32,
        statuses: &[JobStatus],
    ) -> Result<usize, RepositoryError>;
}

/// Keys accepted by [`JobUpdate::from_fields`].
pub const UPDATABLE_FIELDS: &[&str] = &[
    "status",
    "source",
    "mode",
    "job_posting",
    "raw_input",
    "generated_document",
    "rendered_file_path",
    "application_url",
    "application_type",
    "application_result",
    "user_feedback",
    "retry_count",
    "error_message",
    "applied_at",
    "updated_at",
];

/// A field-level patch for [`JobRepository::update`].
///
/// `None` leaves a field untouched. Nullable fields take `Some(None)` to
/// clear them. `job_id`, `created_at` and `updated_at` are not settable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub source: Option<JobSource>,
    pub mode: Option<JobMode>,
    pub job_posting: Option<Option<JobPosting>>,
    pub raw_input: Option<Option<RawInput>>,
    pub generated_document: Option<Option<Document>>,
    pub rendered_file_path: Option<Option<String>>,
    pub application_url: Option<Option<String>>,
    pub application_type: Option<Option<ApplicationType>>,
    pub application_result: Option<Option<ApplicationResult>>,
    pub user_feedback: Option<Option<String>>,
    pub retry_count: Option<u32>,
    pub error_message: Option<Option<String>>,
    pub applied_at: Option<Option<DateTime<Utc>>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn generated_document(mut self, document: Option<Document>) -> Self {
        self.generated_document = Some(document);
        self
    }

    pub fn rendered_file_path(mut self, path: Option<String>) -> Self {
        self.rendered_file_path = Some(path);
        self
    }

    pub fn application_type(mut self, application_type: Option<ApplicationType>) -> Self {
        self.application_type = Some(application_type);
        self
    }

    pub fn application_result(mut self, result: Option<ApplicationResult>) -> Self {
        self.application_result = Some(result);
        self
    }

    pub fn user_feedback(mut self, feedback: Option<String>) -> Self {
        self.user_feedback = Some(feedback);
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn error_message(mut self, message: Option<String>) -> Self {
        self.error_message = Some(message);
        self
    }

    pub fn applied_at(mut self, applied_at: Option<DateTime<Utc>>) -> Self {
        self.applied_at = Some(applied_at);
        self
    }

    /// Builds a patch from loosely typed key/value pairs.
    ///
    /// Fails on the first key outside [`UPDATABLE_FIELDS`] or the first value
    /// of the wrong shape. `updated_at` is accepted but ignored.
    pub fn from_fields(
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, RepositoryError> {
        let mut update = JobUpdate::default();
        for (key, value) in fields {
            match key.as_str() {
                "status" => update.status = Some(required(key, value)?),
                "source" => update.source = Some(required(key, value)?),
                "mode" => update.mode = Some(required(key, value)?),
                "retry_count" => update.retry_count = Some(required(key, value)?),
                "job_posting" => update.job_posting = Some(nullable(key, value)?),
                "raw_input" => update.raw_input = Some(nullable(key, value)?),
                "generated_document" => update.generated_document = Some(nullable(key, value)?),
                "rendered_file_path" => update.rendered_file_path = Some(nullable(key, value)?),
                "application_url" => update.application_url = Some(nullable(key, value)?),
                "application_type" => update.application_type = Some(nullable(key, value)?),
                "application_result" => update.application_result = Some(nullable(key, value)?),
                "user_feedback" => update.user_feedback = Some(nullable(key, value)?),
                "error_message" => update.error_message = Some(nullable(key, value)?),
                "applied_at" => update.applied_at = Some(nullable(key, value)?),
                "updated_at" => {}
                other => {
                    return Err(RepositoryError::InvalidField {
                        field: other.to_string(),
                    })
                }
            }
        }
        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        *self == JobUpdate::default()
    }

    /// Checks the patch against the current record without modifying it.
    pub fn validate_against(&self, record: &JobRecord) -> Result<(), RepositoryError> {
        if let Some(retry_count) = self.retry_count {
            if retry_count < record.retry_count {
                return Err(RepositoryError::InvalidValue {
                    field: "retry_count".to_string(),
                    reason: format!(
                        "cannot decrease from {} to {}",
                        record.retry_count, retry_count
                    ),
                });
            }
        }
        Ok(())
    }

    /// Validates and applies the patch, then stamps `updated_at`.
    /// On error the record is left unchanged.
    pub fn apply_to(&self, record: &mut JobRecord, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.validate_against(record)?;

        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut record.status, &self.status);
        set(&mut record.source, &self.source);
        set(&mut record.mode, &self.mode);
        set(&mut record.job_posting, &self.job_posting);
        set(&mut record.raw_input, &self.raw_input);
        set(&mut record.generated_document, &self.generated_document);
        set(&mut record.rendered_file_path, &self.rendered_file_path);
        set(&mut record.application_url, &self.application_url);
        set(&mut record.application_type, &self.application_type);
        set(&mut record.application_result, &self.application_result);
        set(&mut record.user_feedback, &self.user_feedback);
        set(&mut record.retry_count, &self.retry_count);
        set(&mut record.error_message, &self.error_message);
        set(&mut record.applied_at, &self.applied_at);

        record.updated_at = now.max(record.created_at);
        Ok(())
    }
}

fn required<T: DeserializeOwned>(
    field: &str,
    value: &serde_json::Value,
) -> Result<T, RepositoryError> {
    if value.is_null() {
        return Err(RepositoryError::InvalidValue {
            field: field.to_string(),
            reason: "must not be null".to_string(),
        });
    }
    serde_json::from_value(value.clone()).map_err(|e| RepositoryError::InvalidValue {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn nullable<T: DeserializeOwned>(
    field: &str,
    value: &serde_json::Value,
) -> Result<Option<T>, RepositoryError> {
    serde_json::from_value(value.clone()).map_err(|e| RepositoryError::InvalidValue {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Shared argument check for `cleanup`. Runs before any deletion.
pub(crate) fn validate_cleanup(
    older_than_days: u32,
    statuses: &[JobStatus],
) -> Result<DateTime<Utc>, RepositoryError> {
    if older_than_days < 1 {
        return Err(RepositoryError::InvalidCleanup(
            "older_than_days must be at least 1".to_string(),
        ));
    }
    if statuses.is_empty() {
        return Err(RepositoryError::InvalidCleanup(
            "at least one status is required".to_string(),
        ));
    }
    if let Some(status) = statuses.iter().find(|s| !s.is_terminal()) {
        return Err(RepositoryError::InvalidCleanup(format!(
            "status '{}' is not terminal",
            status
        )));
    }
    Ok(Utc::now() - Duration::days(i64::from(older_than_days)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Open,
    Closed,
}

/// Tracks `initialize`/`close` for a backend.
pub(crate) struct LifecycleGuard {
    state: RwLock<Lifecycle>,
}

impl LifecycleGuard {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    /// Marks the backend open. Returns `false` if it was already open.
    pub(crate) fn open(&self) -> Result<bool, RepositoryError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        match *state {
            Lifecycle::Closed => Err(RepositoryError::Closed),
            Lifecycle::Open => Ok(false),
            Lifecycle::Uninitialized => {
                *state = Lifecycle::Open;
                Ok(true)
            }
        }
    }

    pub(crate) fn close(&self) -> Result<(), RepositoryError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        *state = Lifecycle::Closed;
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<(), RepositoryError> {
        let state = self
            .state
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        match *state {
            Lifecycle::Open => Ok(()),
            Lifecycle::Uninitialized => Err(RepositoryError::NotInitialized),
            Lifecycle::Closed => Err(RepositoryError::Closed),
        }
    }
}
