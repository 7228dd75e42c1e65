//! Application graph.
//!
//! `load` routes on the application type to one of three apply nodes, or
//! straight to `save` when loading failed. Every path ends in `save`.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info};

use crate::collaborators::ApplicationRequest;
use crate::graph::{CompiledGraph, GraphBuilder, GraphError, GraphState, NodeError, END};
use crate::model::{
    ApplicationOutcome, ApplicationResult, ApplicationType, Document, JobPosting, JobStatus,
};
use crate::repository::JobUpdate;

use super::WorkflowContext;

pub const GRAPH_NAME: &str = "application";

#[derive(Debug, Clone)]
pub struct ApplicationState {
    pub job_id: String,
    /// Type chosen with the approval decision, if any.
    pub requested_type: Option<ApplicationType>,
    pub application_type: Option<ApplicationType>,

    pub application_url: Option<String>,
    pub generated_document: Option<Document>,
    pub rendered_file_path: Option<String>,
    pub job_posting: Option<JobPosting>,

    pub result: Option<ApplicationResult>,
    pub status: JobStatus,
    pub current_step: String,
    pub error: Option<NodeError>,
    pub failed_node: Option<String>,
    pub loaded: bool,
}

impl ApplicationState {
    pub fn new(job_id: impl Into<String>, requested_type: Option<ApplicationType>) -> Self {
        Self {
            job_id: job_id.into(),
            requested_type,
            application_type: None,
            application_url: None,
            generated_document: None,
            rendered_file_path: None,
            job_posting: None,
            result: None,
            status: JobStatus::Approved,
            current_step: JobStatus::Approved.as_str().to_string(),
            error: None,
            failed_node: None,
            loaded: false,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn outcome(&self) -> ApplicationOutcome {
        self.result
            .as_ref()
            .map(|r| r.outcome)
            .unwrap_or(ApplicationOutcome::Failed)
    }
}

impl GraphState for ApplicationState {
    fn failure(&self) -> Option<&NodeError> {
        self.error.as_ref()
    }

    fn record_failure(&mut self, node: &str, error: NodeError) {
        match &error {
            NodeError::Application { .. } => {
                self.result = Some(ApplicationResult {
                    outcome: ApplicationOutcome::Failed,
                    application_url: self.application_url.clone(),
                    message: error.to_string(),
                    submitted_at: None,
                });
            }
            NodeError::Load(_) | NodeError::Save(_) => self.status = JobStatus::Failed,
            _ => {}
        }
        self.failed_node = Some(node.to_string());
        self.current_step = JobStatus::Failed.as_str().to_string();
        self.error = Some(error);
    }
}

fn load(context: &WorkflowContext, state: &ApplicationState) -> Result<ApplicationState, NodeError> {
    let record = context
        .repository
        .get(&state.job_id)
        .map_err(|e| NodeError::Load(e.to_string()))?
        .ok_or_else(|| NodeError::Load(format!("job {} not found", state.job_id)))?;

    let mut next = state.clone();
    next.application_type = Some(
        state
            .requested_type
            .or(record.application_type)
            .unwrap_or(context.default_application_type),
    );
    next.application_url = record.application_url;
    next.generated_document = record.generated_document;
    next.rendered_file_path = record.rendered_file_path;
    next.job_posting = record.job_posting;
    next.loaded = true;
    next.current_step = "loaded".to_string();
    Ok(next)
}

fn apply_with(
    context: &WorkflowContext,
    state: &ApplicationState,
    application_type: ApplicationType,
) -> Result<ApplicationState, NodeError> {
    let mut next = state.clone();
    next.status = JobStatus::Applying;
    next.current_step = format!("applying_{}", application_type);

    let request = ApplicationRequest {
        job_id: state.job_id.clone(),
        application_url: state.application_url.clone(),
        document: state.generated_document.clone(),
        rendered_file_path: state.rendered_file_path.clone(),
        job_posting: state.job_posting.clone(),
    };
    let result = context
        .collaborators
        .apply
        .for_type(application_type)
        .apply(&request)
        .map_err(|source| NodeError::Application {
            strategy: application_type,
            source,
        })?;

    info!(
        "Application for job {} via {}: {:?}",
        state.job_id, application_type, result.outcome
    );
    next.result = Some(result);
    Ok(next)
}

fn apply_deep_agent(context: &WorkflowContext, state: &ApplicationState) -> Result<ApplicationState, NodeError> {
    apply_with(context, state, ApplicationType::DeepAgent)
}

fn apply_linkedin(context: &WorkflowContext, state: &ApplicationState) -> Result<ApplicationState, NodeError> {
    apply_with(context, state, ApplicationType::Linkedin)
}

fn apply_manual(context: &WorkflowContext, state: &ApplicationState) -> Result<ApplicationState, NodeError> {
    apply_with(context, state, ApplicationType::Manual)
}

fn save(context: &WorkflowContext, state: &ApplicationState) -> Result<ApplicationState, NodeError> {
    let mut next = state.clone();
    if !state.loaded {
        next.status = JobStatus::Failed;
        next.current_step = JobStatus::Failed.as_str().to_string();
        return Ok(next);
    }

    let outcome = state.outcome();
    let status = outcome.final_status();
    let applied_at = match outcome {
        ApplicationOutcome::Success => Some(
            state
                .result
                .as_ref()
                .and_then(|r| r.submitted_at)
                .unwrap_or_else(Utc::now),
        ),
        _ => None,
    };
    let error_message = match (&state.error, outcome) {
        (Some(error), _) => Some(error.to_string()),
        (None, ApplicationOutcome::Failed) => state.result.as_ref().map(|r| r.message.clone()),
        (None, _) => None,
    };

    let update = JobUpdate::new()
        .status(status)
        .application_type(state.application_type)
        .application_result(state.result.clone())
        .error_message(error_message)
        .applied_at(applied_at);

    if let Err(e) = context.repository.update(&state.job_id, &update) {
        error!("Failed to save job {} after application: {}", state.job_id, e);
        return Err(NodeError::Save(e.to_string()));
    }

    info!("Job {} saved after application with status {}", state.job_id, status);
    next.status = status;
    next.current_step = status.as_str().to_string();
    Ok(next)
}

fn route_by_type(state: &ApplicationState) -> &'static str {
    if state.error.is_some() {
        return "error";
    }
    state.application_type.unwrap_or_default().as_str()
}

pub(crate) fn build(
    context: Arc<WorkflowContext>,
    max_steps: usize,
) -> Result<CompiledGraph<ApplicationState>, GraphError> {
    let node = |f: fn(&WorkflowContext, &ApplicationState) -> Result<ApplicationState, NodeError>| {
        let context = Arc::clone(&context);
        move |state: &ApplicationState| f(&context, state)
    };

    GraphBuilder::<ApplicationState>::new(GRAPH_NAME)
        .add_node("load", node(load))
        .add_node("apply_deep_agent", node(apply_deep_agent))
        .add_node("apply_linkedin", node(apply_linkedin))
        .add_node("apply_manual", node(apply_manual))
        .add_node("save", node(save))
        .set_entry("load")
        .add_conditional_edges(
            "load",
            route_by_type,
            [
                (ApplicationType::DeepAgent.as_str(), "apply_deep_agent"),
                (ApplicationType::Linkedin.as_str(), "apply_linkedin"),
                (ApplicationType::Manual.as_str(), "apply_manual"),
                ("error", "save"),
            ],
        )
        .add_edge("apply_deep_agent", "save")
        .add_edge("apply_linkedin", "save")
        .add_edge("apply_manual", "save")
        .add_edge("save", END)
        .max_steps(max_steps)
        .compile()
}
