use serde::Serialize;

use crate::model::JobStatus;
use crate::workflows::{ApplicationState, PreparationState, RetryState, WorkflowKind};

/// Initial run-state for one graph run.
#[derive(Debug, Clone)]
pub enum RunInput {
    Preparation(PreparationState),
    Retry(RetryState),
    Application(ApplicationState),
}

impl RunInput {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            RunInput::Preparation(_) => WorkflowKind::Preparation,
            RunInput::Retry(_) => WorkflowKind::Retry,
            RunInput::Application(_) => WorkflowKind::Application,
        }
    }
}

/// A unit of work for the pool: run one graph for one job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub job_id: String,
    pub input: RunInput,
}

impl RunRequest {
    pub fn new(run_id: impl Into<String>, job_id: impl Into<String>, input: RunInput) -> Self {
        Self {
            run_id: run_id.into(),
            job_id: job_id.into(),
            input,
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        self.input.kind()
    }
}

/// Summary of a finished run, sent back on the result channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub job_id: String,
    pub kind: WorkflowKind,
    pub status: JobStatus,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The graph itself failed (bad route or step limit), not a node.
    pub aborted: bool,
}

impl RunReport {
    pub fn is_failed(&self) -> bool {
        self.aborted || self.status == JobStatus::Failed
    }

    pub(crate) fn from_preparation(run_id: &str, state: &PreparationState) -> Self {
        Self {
            run_id: run_id.to_string(),
            job_id: state.job_id.clone(),
            kind: WorkflowKind::Preparation,
            status: state.status,
            current_step: state.current_step.clone(),
            error: state.error_message(),
            aborted: false,
        }
    }

    pub(crate) fn from_retry(run_id: &str, state: &RetryState) -> Self {
        Self {
            run_id: run_id.to_string(),
            job_id: state.job_id.clone(),
            kind: WorkflowKind::Retry,
            status: state.status,
            current_step: state.current_step.clone(),
            error: state.error_message(),
            aborted: false,
        }
    }

    pub(crate) fn from_application(run_id: &str, state: &ApplicationState) -> Self {
        Self {
            run_id: run_id.to_string(),
            job_id: state.job_id.clone(),
            kind: WorkflowKind::Application,
            status: state.status,
            current_step: state.current_step.clone(),
            error: state.error_message(),
            aborted: false,
        }
    }

    pub(crate) fn aborted(request: &RunRequest, error: String) -> Self {
        Self {
            run_id: request.run_id.clone(),
            job_id: request.job_id.clone(),
            kind: request.kind(),
            status: JobStatus::Failed,
            current_step: JobStatus::Failed.as_str().to_string(),
            error: Some(error),
            aborted: true,
        }
    }
}
