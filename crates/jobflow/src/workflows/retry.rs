//! Retry graph: `load ─┬─ compose ─ render ─ save`, with load failures
//! routed straight to `save`.

use std::sync::Arc;

use log::{error, info, warn};

use crate::graph::{CompiledGraph, GraphBuilder, GraphError, GraphState, NodeError, END};
use crate::model::posting::non_blank;
use crate::model::{retry_status, Document, JobMode, JobPosting, JobStatus, RawInput};
use crate::repository::JobUpdate;

use super::steps::{self, RenderRequest};
use super::WorkflowContext;

pub const GRAPH_NAME: &str = "retry";

#[derive(Debug, Clone)]
pub struct RetryState {
    pub job_id: String,
    pub feedback: String,
    pub profile: Option<Document>,
    pub retry_count: u32,

    pub job_posting: Option<JobPosting>,
    pub raw_input: Option<RawInput>,
    pub mode: Option<JobMode>,
    pub generated_document: Option<Document>,
    pub rendered_file_path: Option<String>,

    pub status: JobStatus,
    pub current_step: String,
    pub error: Option<NodeError>,
    pub failed_node: Option<String>,
    /// Whether `load` found the stored record.
    pub loaded: bool,
}

impl RetryState {
    /// `retry_count` is only a placeholder until `load` reads the stored value.
    pub fn new(
        job_id: impl Into<String>,
        feedback: impl Into<String>,
        profile: Option<Document>,
        retry_count: u32,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            feedback: feedback.into(),
            profile,
            retry_count,
            job_posting: None,
            raw_input: None,
            mode: None,
            generated_document: None,
            rendered_file_path: None,
            status: JobStatus::Pending,
            current_step: "queued".to_string(),
            error: None,
            failed_node: None,
            loaded: false,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

impl GraphState for RetryState {
    fn failure(&self) -> Option<&NodeError> {
        self.error.as_ref()
    }

    fn record_failure(&mut self, node: &str, error: NodeError) {
        match &error {
            NodeError::Composition(_) => self.generated_document = None,
            NodeError::Rendering(_)
            | NodeError::RenderSkipped { .. }
            | NodeError::NothingToRender { .. } => self.rendered_file_path = None,
            NodeError::Load(_) | NodeError::Save(_) => self.status = JobStatus::Failed,
            _ => {}
        }
        self.failed_node = Some(node.to_string());
        self.current_step = JobStatus::Failed.as_str().to_string();
        self.error = Some(error);
    }
}

fn load(context: &WorkflowContext, state: &RetryState) -> Result<RetryState, NodeError> {
    let record = context
        .repository
        .get(&state.job_id)
        .map_err(|e| NodeError::Load(e.to_string()))?
        .ok_or_else(|| NodeError::Load(format!("job {} not found", state.job_id)))?;

    let mut next = state.clone();
    next.job_posting = record.job_posting;
    next.raw_input = record.raw_input;
    next.mode = Some(record.mode);
    next.retry_count = record.retry_count + 1;
    next.loaded = true;
    next.current_step = "loaded".to_string();
    info!(
        "Loaded job {} for retry #{}",
        state.job_id, next.retry_count
    );
    Ok(next)
}

fn compose(context: &WorkflowContext, state: &RetryState) -> Result<RetryState, NodeError> {
    let mut next = state.clone();
    next.status = JobStatus::Composing;
    next.current_step = JobStatus::Composing.as_str().to_string();
    let document = steps::compose(
        context,
        state.profile.as_ref(),
        state.job_posting.as_ref(),
        Some(&state.feedback),
    )?;
    next.generated_document = Some(document);
    next.current_step = "composed".to_string();
    Ok(next)
}

fn render(context: &WorkflowContext, state: &RetryState) -> Result<RetryState, NodeError> {
    let mut next = state.clone();
    next.status = JobStatus::Rendering;
    next.current_step = JobStatus::Rendering.as_str().to_string();
    let path = steps::render(
        context,
        &RenderRequest {
            job_id: &state.job_id,
            document: state.generated_document.as_ref(),
            posting: state.job_posting.as_ref(),
            previous_error: state.error.as_ref(),
            template_name: state
                .raw_input
                .as_ref()
                .and_then(|raw| non_blank(&raw.template_name)),
            version: Some(state.retry_count),
        },
    )?;
    next.rendered_file_path = Some(path);
    next.current_step = "rendered".to_string();
    Ok(next)
}

fn save(context: &WorkflowContext, state: &RetryState) -> Result<RetryState, NodeError> {
    let mut next = state.clone();

    if !state.loaded {
        warn!("Job {} was not loaded, nothing to update", state.job_id);
        next.status = JobStatus::Failed;
        next.current_step = JobStatus::Failed.as_str().to_string();
        return Ok(next);
    }

    let status = retry_status(state.rendered_file_path.is_some());
    let error_message = match status {
        JobStatus::Pending => None,
        _ => state.error_message(),
    };
    let update = JobUpdate::new()
        .status(status)
        .generated_document(state.generated_document.clone())
        .rendered_file_path(state.rendered_file_path.clone())
        .user_feedback(Some(state.feedback.clone()))
        .retry_count(state.retry_count)
        .error_message(error_message);

    if let Err(e) = context.repository.update(&state.job_id, &update) {
        error!("Failed to save job {} after retry: {}", state.job_id, e);
        return Err(NodeError::Save(e.to_string()));
    }

    info!(
        "Job {} saved after retry #{} with status {}",
        state.job_id, state.retry_count, status
    );
    next.status = status;
    next.current_step = status.as_str().to_string();
    Ok(next)
}

fn route_after_load(state: &RetryState) -> &'static str {
    if state.error.is_some() {
        "error"
    } else {
        "compose"
    }
}

pub(crate) fn build(
    context: Arc<WorkflowContext>,
    max_steps: usize,
) -> Result<CompiledGraph<RetryState>, GraphError> {
    let node = |f: fn(&WorkflowContext, &RetryState) -> Result<RetryState, NodeError>| {
        let context = Arc::clone(&context);
        move |state: &RetryState| f(&context, state)
    };

    GraphBuilder::<RetryState>::new(GRAPH_NAME)
        .add_node("load", node(load))
        .add_node("compose", node(compose))
        .add_node("render", node(render))
        .add_node("save", node(save))
        .set_entry("load")
        .add_conditional_edges(
            "load",
            route_after_load,
            [("error", "save"), ("compose", "compose")],
        )
        .add_edge("compose", "render")
        .add_edge("render", "save")
        .add_edge("save", END)
        .max_steps(max_steps)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NoopProgress;
    use crate::model::{JobRecord, JobSource};
    use crate::repository::JobRepository;
    use crate::workflows::test_support;
    use tempfile::TempDir;

    fn pending_record(job_id: &str, retry_count: u32) -> JobRecord {
        let mut record = JobRecord::new(job_id, JobSource::Manual, JobMode::Full);
        record.status = JobStatus::Pending;
        record.retry_count = retry_count;
        record.raw_input = Some(RawInput::manual("Rust Engineer", "Acme", "Rust"));
        record.job_posting = Some(JobPosting {
            id: job_id.into(),
            title: "Rust Engineer".into(),
            company: "Acme".into(),
            description: "Rust".into(),
            requirements: None,
            location: "Remote".into(),
            url: String::new(),
            is_remote: true,
            salary_range: None,
            experience_level: None,
            job_type: None,
        });
        record.error_message = Some("stale".into());
        record
    }

    #[test]
    fn test_retry_increments_count_and_returns_to_pending() {
        let dir = TempDir::new().unwrap();
        let (context, repo) = test_support::context(&dir);
        repo.create(&pending_record("job-1", 1)).unwrap();
        let graph = build(Arc::new(context), 25).unwrap();

        let state = graph
            .invoke(
                "run-1",
                RetryState::new("job-1", "More emphasis on Rust", Some(test_support::profile()), 0),
                &NoopProgress,
            )
            .unwrap();
        assert_eq!(state.status, JobStatus::Pending);

        let record = repo.get("job-1").unwrap().unwrap();
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.user_feedback.as_deref(), Some("More emphasis on Rust"));
        assert!(record.error_message.is_none());
        assert!(record
            .rendered_file_path
            .unwrap()
            .ends_with("Ada_Lovelace_Acme_Rust_Engineer_v2.json"));
        assert!(record
            .generated_document
            .unwrap()
            .summary
            .contains("More emphasis on Rust"));
    }

    #[test]
    fn test_missing_record_skips_update() {
        let dir = TempDir::new().unwrap();
        let (context, repo) = test_support::context(&dir);
        let graph = build(Arc::new(context), 25).unwrap();

        let state = graph
            .invoke(
                "run-1",
                RetryState::new("ghost", "feedback", Some(test_support::profile()), 4),
                &NoopProgress,
            )
            .unwrap();
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.retry_count, 4);
        assert_eq!(
            state.error_message().as_deref(),
            Some("Failed to load job data: job ghost not found")
        );
        assert_eq!(graph.get_state("run-1").unwrap().visited, vec!["load", "save"]);
        assert!(repo.get("ghost").unwrap().is_none());
    }

    #[test]
    fn test_failed_retry_still_counts() {
        let dir = TempDir::new().unwrap();
        let (context, repo) = test_support::context(&dir);
        repo.create(&pending_record("job-1", 0)).unwrap();
        let graph = build(Arc::new(context), 25).unwrap();

        // No profile: composition fails, render is skipped.
        graph
            .invoke("run-1", RetryState::new("job-1", "shorter", None, 0), &NoopProgress)
            .unwrap();

        let record = repo.get("job-1").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.retry_count, 1);
        assert!(record.rendered_file_path.is_none());
        assert_eq!(
            record.error_message.as_deref(),
            Some("PDF generation skipped due to previous error: CV composition failed: missing required input: profile")
        );
    }
}
