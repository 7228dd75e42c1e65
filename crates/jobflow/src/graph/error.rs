use std::path::PathBuf;

use thiserror::Error;

use crate::model::ApplicationType;

/// Error returned by an external collaborator (extractor, composer,
/// renderer, filter, apply strategy).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("{0}")]
    Failed(String),

    /// The integration exists as a named step but has no implementation yet.
    #[error("{feature} is not implemented")]
    NotImplemented { feature: String },

    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("I/O error for '{path}': {reason}")]
    Io { path: PathBuf, reason: String },
}

impl CollaboratorError {
    pub fn failed(message: impl Into<String>) -> Self {
        CollaboratorError::Failed(message.into())
    }

    pub fn not_implemented(feature: impl Into<String>) -> Self {
        CollaboratorError::NotImplemented {
            feature: feature.into(),
        }
    }
}

/// A node failure. Recorded into run-state by the engine, never raised
/// out of a run. The message names the phase that failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Job extraction failed: {0}")]
    Extraction(#[source] CollaboratorError),

    #[error("Job filtering failed: {0}")]
    Filtering(#[source] CollaboratorError),

    #[error("CV composition failed: {0}")]
    Composition(#[source] CollaboratorError),

    #[error("PDF generation failed: {0}")]
    Rendering(#[source] CollaboratorError),

    #[error("PDF generation skipped due to previous error: {previous}")]
    RenderSkipped { previous: String },

    #[error("PDF generation skipped for job {job_id}: No document available")]
    NothingToRender { job_id: String },

    #[error("Failed to load job data: {0}")]
    Load(String),

    #[error("Application via {strategy} failed: {source}")]
    Application {
        strategy: ApplicationType,
        #[source]
        source: CollaboratorError,
    },

    #[error("Failed to save job: {0}")]
    Save(String),
}

impl NodeError {
    /// The collaborator error behind this failure, if any.
    pub fn collaborator(&self) -> Option<&CollaboratorError> {
        match self {
            NodeError::Extraction(e)
            | NodeError::Filtering(e)
            | NodeError::Composition(e)
            | NodeError::Rendering(e)
            | NodeError::Application { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Whether the failure comes from an integration that does not exist yet.
    pub fn is_not_implemented(&self) -> bool {
        matches!(
            self.collaborator(),
            Some(CollaboratorError::NotImplemented { .. })
        )
    }
}

/// Fatal graph configuration or execution errors. Unlike [`NodeError`],
/// these abort the run and are returned to the caller of `invoke`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph '{graph}' has no nodes")]
    Empty { graph: String },

    #[error("Graph '{graph}' has no entry node")]
    MissingEntry { graph: String },

    #[error("Graph '{graph}' defines node '{node}' twice")]
    DuplicateNode { graph: String, node: String },

    #[error("Graph '{graph}' defines more than one outgoing edge for '{node}'")]
    DuplicateEdge { graph: String, node: String },

    #[error("Graph '{graph}' references unknown node '{node}'")]
    UnknownNode { graph: String, node: String },

    #[error("Router after '{node}' in graph '{graph}' returned unknown route '{route}'")]
    UnknownRoute {
        graph: String,
        node: String,
        route: String,
    },

    #[error("Run {run_id} of graph '{graph}' exceeded {max_steps} steps")]
    StepLimitExceeded {
        graph: String,
        run_id: String,
        max_steps: usize,
    },
}
