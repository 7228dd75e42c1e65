//! External collaborators called by the graph nodes.
//!
//! Extraction, composition, rendering, filtering and applying are treated as
//! opaque services. Each sits behind a narrow trait so the graphs can run
//! against the deterministic defaults here or against real integrations.

pub mod apply;
pub mod compose;
pub mod extract;
pub mod filter;
pub mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::schema::FilterConfig;
use crate::graph::CollaboratorError;
use crate::model::{
    ApplicationResult, ApplicationType, Document, JobPosting, JobSource, RawInput,
};

pub use apply::{ManualApply, UnavailableApply};
pub use compose::ProfileComposer;
pub use extract::SourceExtractor;
pub use filter::{AcceptAll, KeywordFilter};
pub use render::JsonRenderer;

pub trait JobExtractor: Send + Sync {
    fn extract(
        &self,
        job_id: &str,
        source: JobSource,
        raw_input: &RawInput,
    ) -> Result<JobPosting, CollaboratorError>;
}

/// Verdict of the suitability filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suitability {
    Suitable,
    Unsuitable { reason: String },
}

impl Suitability {
    pub fn is_suitable(&self) -> bool {
        matches!(self, Suitability::Suitable)
    }
}

pub trait SuitabilityFilter: Send + Sync {
    fn evaluate(&self, posting: &JobPosting) -> Result<Suitability, CollaboratorError>;
}

/// Tailors the candidate profile to a posting. `feedback` carries the
/// reviewer's notes on retries.
pub trait DocumentComposer: Send + Sync {
    fn compose(
        &self,
        profile: &Document,
        posting: &JobPosting,
        feedback: Option<&str>,
    ) -> Result<Document, CollaboratorError>;
}

/// Embedded in the rendered file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RenderMetadata {
    pub subject: String,
    pub keywords: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
}

pub trait DocumentRenderer: Send + Sync {
    /// File extension of rendered output, without the dot.
    fn extension(&self) -> &str;

    /// Writes `document` to `output` and returns the path actually written.
    fn render(
        &self,
        document: &Document,
        output: &Path,
        metadata: &RenderMetadata,
    ) -> Result<PathBuf, CollaboratorError>;
}

/// Everything an apply integration gets to work with.
#[derive(Debug, Clone, Default)]
pub struct ApplicationRequest {
    pub job_id: String,
    pub application_url: Option<String>,
    pub document: Option<Document>,
    pub rendered_file_path: Option<String>,
    pub job_posting: Option<JobPosting>,
}

pub trait ApplyStrategy: Send + Sync {
    fn apply(&self, request: &ApplicationRequest) -> Result<ApplicationResult, CollaboratorError>;
}

/// One apply strategy per [`ApplicationType`].
#[derive(Clone)]
pub struct ApplyStrategies {
    deep_agent: Arc<dyn ApplyStrategy>,
    linkedin: Arc<dyn ApplyStrategy>,
    manual: Arc<dyn ApplyStrategy>,
}

impl Default for ApplyStrategies {
    fn default() -> Self {
        Self {
            deep_agent: Arc::new(UnavailableApply::new("Deep Agent browser automation")),
            linkedin: Arc::new(UnavailableApply::new("LinkedIn Easy Apply automation")),
            manual: Arc::new(ManualApply),
        }
    }
}

impl ApplyStrategies {
    pub fn with_deep_agent(mut self, strategy: Arc<dyn ApplyStrategy>) -> Self {
        self.deep_agent = strategy;
        self
    }

    pub fn with_linkedin(mut self, strategy: Arc<dyn ApplyStrategy>) -> Self {
        self.linkedin = strategy;
        self
    }

    pub fn with_manual(mut self, strategy: Arc<dyn ApplyStrategy>) -> Self {
        self.manual = strategy;
        self
    }

    pub fn for_type(&self, application_type: ApplicationType) -> &Arc<dyn ApplyStrategy> {
        match application_type {
            ApplicationType::DeepAgent => &self.deep_agent,
            ApplicationType::Linkedin => &self.linkedin,
            ApplicationType::Manual => &self.manual,
        }
    }
}

/// The full set of collaborators the graphs are built with.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn JobExtractor>,
    pub filter: Arc<dyn SuitabilityFilter>,
    pub composer: Arc<dyn DocumentComposer>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub apply: ApplyStrategies,
}

impl Collaborators {
    /// Deterministic, offline defaults.
    pub fn defaults(filter: &FilterConfig) -> Self {
        let suitability: Arc<dyn SuitabilityFilter> =
            if filter.require_remote || !filter.excluded_keywords.is_empty() {
                Arc::new(KeywordFilter::new(
                    filter.require_remote,
                    &filter.excluded_keywords,
                ))
            } else {
                Arc::new(AcceptAll)
            };

        Self {
            extractor: Arc::new(SourceExtractor),
            filter: suitability,
            composer: Arc::new(ProfileComposer),
            renderer: Arc::new(JsonRenderer),
            apply: ApplyStrategies::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn JobExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn SuitabilityFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_composer(mut self, composer: Arc<dyn DocumentComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_apply(mut self, apply: ApplyStrategies) -> Self {
        self.apply = apply;
        self
    }
}
