use thiserror::Error;

use crate::db::DatabaseError;

/// Errors raised by a [`JobRepository`](super::JobRepository).
///
/// These indicate request or programming errors and are always returned to
/// the caller, never folded into a job's `error_message` by the repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Job {0} already exists")]
    Duplicate(String),

    #[error("Field '{field}' is not updatable")]
    InvalidField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid cleanup parameters: {0}")]
    InvalidCleanup(String),

    #[error("Repository has not been initialized")]
    NotInitialized,

    #[error("Repository is closed")]
    Closed,

    #[error("Repository lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
