//! Compose and render steps shared by the preparation and retry graphs.

use crate::collaborators::render::ensure_directory;
use crate::collaborators::RenderMetadata;
use crate::graph::{CollaboratorError, NodeError};
use crate::model::{Document, JobPosting};
use crate::sanitize::{document_filename, redact_path};

use super::WorkflowContext;

pub(crate) fn compose(
    context: &WorkflowContext,
    profile: Option<&Document>,
    posting: Option<&JobPosting>,
    feedback: Option<&str>,
) -> Result<Document, NodeError> {
    let profile = profile.ok_or(NodeError::Composition(CollaboratorError::MissingInput(
        "profile",
    )))?;
    let posting = posting.ok_or(NodeError::Composition(CollaboratorError::MissingInput(
        "job posting",
    )))?;

    context
        .collaborators
        .composer
        .compose(profile, posting, feedback)
        .map_err(NodeError::Composition)
}

/// What the render step needs to know about the run.
pub(crate) struct RenderRequest<'a> {
    pub job_id: &'a str,
    pub document: Option<&'a Document>,
    pub posting: Option<&'a JobPosting>,
    pub previous_error: Option<&'a NodeError>,
    pub template_name: Option<&'a str>,
    /// Set on retries; appended to the filename and the subject.
    pub version: Option<u32>,
}

pub(crate) fn render(context: &WorkflowContext, request: &RenderRequest<'_>) -> Result<String, NodeError> {
    let Some(document) = request.document else {
        return Err(match request.previous_error {
            Some(previous) => NodeError::RenderSkipped {
                previous: previous.to_string(),
            },
            None => NodeError::NothingToRender {
                job_id: request.job_id.to_string(),
            },
        });
    };

    let name = non_empty(document.candidate_name()).unwrap_or("Unknown");
    let company = request
        .posting
        .and_then(|p| non_empty(&p.company))
        .unwrap_or("unknown");
    let title = request
        .posting
        .and_then(|p| non_empty(&p.title))
        .unwrap_or("unknown");

    let renderer = &context.collaborators.renderer;
    let filename = document_filename(name, company, title, request.version, renderer.extension());

    ensure_directory(&context.output_directory).map_err(NodeError::Rendering)?;
    let output = context.output_directory.join(&filename);

    let (subject, keywords) = match request.version {
        Some(version) => (
            format!("Resume for {} at {} (Retry #{})", title, company, version),
            format!("{}, {}, retry", company, title),
        ),
        None => (
            format!("Resume for {} at {}", title, company),
            format!("{}, {}", company, title),
        ),
    };
    let metadata = RenderMetadata {
        subject,
        keywords,
        template_name: Some(
            request
                .template_name
                .unwrap_or(&context.template_name)
                .to_string(),
        ),
    };

    let path = renderer
        .render(document, &output, &metadata)
        .map_err(NodeError::Rendering)?;
    tracing::debug!(file = %redact_path(&path), "Document rendered");
    Ok(path.to_string_lossy().to_string())
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
