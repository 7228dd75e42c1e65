use std::path::PathBuf;
use thiserror::Error;

use crate::graph::GraphError;
use crate::model::JobStatus;
use crate::repository::RepositoryError;

#[derive(Error, Debug)]
pub enum JobflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

/// Errors returned to callers of [`JobOrchestrator`](crate::JobOrchestrator).
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Job {0} not found")]
    JobNotFound(String),

    #[error("Job {job_id} is not pending review (status: {status})")]
    NotPending { job_id: String, status: JobStatus },

    #[error("Job {job_id} already has a run in progress ({run_id})")]
    RunInProgress { job_id: String, run_id: String },

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Posting {url} was already submitted as job {job_id}")]
    DuplicatePosting { url: String, job_id: String },

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

pub type Result<T> = std::result::Result<T, JobflowError>;
