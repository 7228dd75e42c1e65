//! Preparation graph.
//!
//! ```text
//! extract ─┬─ error ────────────────────────────────┐
//!          ├─ linkedin ─ filter ─┬─ skip ─ END      │
//!          │                     └─ compose ─┐      │
//!          └─ compose ───────────────────────┴─ render ─ save ─ END
//! ```

use std::sync::Arc;

use log::{error, info};

use crate::collaborators::Suitability;
use crate::graph::{CompiledGraph, GraphBuilder, GraphError, GraphState, NodeError, END};
use crate::model::posting::non_blank;
use crate::model::{
    preparation_status, Document, JobMode, JobPosting, JobRecord, JobSource, JobStatus, RawInput,
};

use super::steps::{self, RenderRequest};
use super::WorkflowContext;

pub const GRAPH_NAME: &str = "preparation";

/// Step name reported when the filter rejects a posting.
pub const SKIPPED_STEP: &str = "skipped";

#[derive(Debug, Clone)]
pub struct PreparationState {
    pub job_id: String,
    pub source: JobSource,
    pub mode: JobMode,
    pub raw_input: RawInput,
    pub profile: Option<Document>,

    pub job_posting: Option<JobPosting>,
    pub generated_document: Option<Document>,
    pub rendered_file_path: Option<String>,

    pub status: JobStatus,
    pub current_step: String,
    pub error: Option<NodeError>,
    pub failed_node: Option<String>,
    /// Set when the filter rejected the posting; the run ends without a record.
    pub skip_reason: Option<String>,
    /// Whether `save` stored the record.
    pub persisted: bool,
}

impl PreparationState {
    pub fn new(
        job_id: impl Into<String>,
        source: JobSource,
        mode: JobMode,
        raw_input: RawInput,
        profile: Option<Document>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            source,
            mode,
            raw_input,
            profile,
            job_posting: None,
            generated_document: None,
            rendered_file_path: None,
            status: JobStatus::Queued,
            current_step: JobStatus::Queued.as_str().to_string(),
            error: None,
            failed_node: None,
            skip_reason: None,
            persisted: false,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    fn application_url(&self) -> Option<String> {
        non_blank(&self.raw_input.application_url)
            .map(str::to_string)
            .or_else(|| {
                self.job_posting
                    .as_ref()
                    .map(|p| p.url.trim())
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
            })
    }

    fn enter(&self, status: JobStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.current_step = status.as_str().to_string();
        next
    }
}

impl GraphState for PreparationState {
    fn failure(&self) -> Option<&NodeError> {
        self.error.as_ref()
    }

    fn record_failure(&mut self, node: &str, error: NodeError) {
        match &error {
            NodeError::Composition(_) => self.generated_document = None,
            NodeError::Rendering(_)
            | NodeError::RenderSkipped { .. }
            | NodeError::NothingToRender { .. } => self.rendered_file_path = None,
            NodeError::Save(_) => self.status = JobStatus::Failed,
            _ => {}
        }
        self.failed_node = Some(node.to_string());
        self.current_step = JobStatus::Failed.as_str().to_string();
        self.error = Some(error);
    }
}

fn extract(context: &WorkflowContext, state: &PreparationState) -> Result<PreparationState, NodeError> {
    let mut next = state.enter(JobStatus::Extracting);
    let posting = context
        .collaborators
        .extractor
        .extract(&state.job_id, state.source, &state.raw_input)
        .map_err(NodeError::Extraction)?;
    info!(
        "Extracted posting for {}: {} at {}",
        state.job_id, posting.title, posting.company
    );
    next.job_posting = Some(posting);
    next.current_step = "extracted".to_string();
    Ok(next)
}

fn filter(context: &WorkflowContext, state: &PreparationState) -> Result<PreparationState, NodeError> {
    let mut next = state.enter(JobStatus::Filtering);
    let Some(posting) = state.job_posting.as_ref() else {
        return Ok(next);
    };
    match context
        .collaborators
        .filter
        .evaluate(posting)
        .map_err(NodeError::Filtering)?
    {
        Suitability::Suitable => {
            next.current_step = "filtered".to_string();
        }
        Suitability::Unsuitable { reason } => {
            info!("Job {} skipped by filter: {}", state.job_id, reason);
            next.current_step = SKIPPED_STEP.to_string();
            next.skip_reason = Some(reason);
        }
    }
    Ok(next)
}

fn compose(context: &WorkflowContext, state: &PreparationState) -> Result<PreparationState, NodeError> {
    let mut next = state.enter(JobStatus::Composing);
    let document = steps::compose(
        context,
        state.profile.as_ref(),
        state.job_posting.as_ref(),
        None,
    )?;
    next.generated_document = Some(document);
    next.current_step = "composed".to_string();
    Ok(next)
}

fn render(context: &WorkflowContext, state: &PreparationState) -> Result<PreparationState, NodeError> {
    let mut next = state.enter(JobStatus::Rendering);
    let path = steps::render(
        context,
        &RenderRequest {
            job_id: &state.job_id,
            document: state.generated_document.as_ref(),
            posting: state.job_posting.as_ref(),
            previous_error: state.error.as_ref(),
            template_name: non_blank(&state.raw_input.template_name),
            version: None,
        },
    )?;
    next.rendered_file_path = Some(path);
    next.current_step = "rendered".to_string();
    Ok(next)
}

fn save(context: &WorkflowContext, state: &PreparationState) -> Result<PreparationState, NodeError> {
    let failed = state.error.is_some() && state.rendered_file_path.is_none();
    let status = preparation_status(state.mode, failed);

    let mut record = JobRecord::new(&state.job_id, state.source, state.mode);
    record.status = status;
    record.job_posting = state.job_posting.clone();
    record.raw_input = Some(state.raw_input.clone());
    record.generated_document = state.generated_document.clone();
    record.rendered_file_path = state.rendered_file_path.clone();
    record.application_url = state.application_url();
    record.error_message = state.error_message();

    if let Err(e) = context.repository.create(&record) {
        error!("Failed to save job {}: {}", state.job_id, e);
        return Err(NodeError::Save(e.to_string()));
    }

    info!("Job {} saved with status {}", state.job_id, status);
    let mut next = state.enter(status);
    next.persisted = true;
    Ok(next)
}

fn route_after_extract(state: &PreparationState) -> &'static str {
    if state.error.is_some() {
        "error"
    } else if state.source == JobSource::Linkedin {
        "filter"
    } else {
        "compose"
    }
}

fn route_after_filter(state: &PreparationState) -> &'static str {
    // A filter error is recoverable: composition still runs.
    if state.skip_reason.is_some() {
        "skip"
    } else {
        "compose"
    }
}

pub(crate) fn build(
    context: Arc<WorkflowContext>,
    max_steps: usize,
) -> Result<CompiledGraph<PreparationState>, GraphError> {
    let node = |f: fn(&WorkflowContext, &PreparationState) -> Result<PreparationState, NodeError>| {
        let context = Arc::clone(&context);
        move |state: &PreparationState| f(&context, state)
    };

    GraphBuilder::<PreparationState>::new(GRAPH_NAME)
        .add_node("extract", node(extract))
        .add_node("filter", node(filter))
        .add_node("compose", node(compose))
        .add_node("render", node(render))
        .add_node("save", node(save))
        .set_entry("extract")
        .add_conditional_edges(
            "extract",
            route_after_extract,
            [("error", "save"), ("filter", "filter"), ("compose", "compose")],
        )
        .add_conditional_edges(
            "filter",
            route_after_filter,
            [("skip", END), ("compose", "compose")],
        )
        .add_edge("compose", "render")
        .add_edge("render", "save")
        .add_edge("save", END)
        .max_steps(max_steps)
        .compile()
}
