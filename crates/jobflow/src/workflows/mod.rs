//! The three job workflows, each a compiled step graph over its own state.
//!
//! - preparation: extract, optionally filter, compose, render, create the record
//! - retry: reload a pending record, recompose with feedback, render, update
//! - application: reload an approved record, apply through a strategy, update

pub mod application;
pub mod preparation;
pub mod retry;
mod steps;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collaborators::Collaborators;
use crate::graph::{CompiledGraph, GraphError};
use crate::model::{ApplicationType, UnknownVariant};
use crate::repository::JobRepository;

pub use application::ApplicationState;
pub use preparation::PreparationState;
pub use retry::RetryState;

/// Which workflow a run belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Preparation,
    Retry,
    Application,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Preparation => "preparation",
            WorkflowKind::Retry => "retry",
            WorkflowKind::Application => "application",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparation" => Ok(WorkflowKind::Preparation),
            "retry" => Ok(WorkflowKind::Retry),
            "application" => Ok(WorkflowKind::Application),
            other => Err(UnknownVariant {
                kind: "workflow",
                value: other.to_string(),
            }),
        }
    }
}

/// Shared dependencies of every workflow node.
#[derive(Clone)]
pub struct WorkflowContext {
    pub repository: Arc<dyn JobRepository>,
    pub collaborators: Collaborators,
    pub output_directory: PathBuf,
    pub template_name: String,
    pub default_application_type: ApplicationType,
}

/// The compiled graphs, shared by all workers.
pub struct Workflows {
    pub preparation: CompiledGraph<PreparationState>,
    pub retry: CompiledGraph<RetryState>,
    pub application: CompiledGraph<ApplicationState>,
}

impl Workflows {
    pub fn build(context: WorkflowContext, max_steps: usize) -> Result<Self, GraphError> {
        let context = Arc::new(context);
        Ok(Self {
            preparation: preparation::build(Arc::clone(&context), max_steps)?,
            retry: retry::build(Arc::clone(&context), max_steps)?,
            application: application::build(context, max_steps)?,
        })
    }

    /// Drops the snapshot of one run.
    pub fn forget_run(&self, kind: WorkflowKind, run_id: &str) -> bool {
        match kind {
            WorkflowKind::Preparation => self.preparation.snapshots().remove(run_id),
            WorkflowKind::Retry => self.retry.snapshots().remove(run_id),
            WorkflowKind::Application => self.application.snapshots().remove(run_id),
        }
    }

    /// Drops snapshots of runs that finished more than `max_age` ago.
    pub fn prune_finished(&self, max_age: chrono::Duration) -> usize {
        self.preparation.snapshots().prune_finished(max_age)
            + self.retry.snapshots().prune_finished(max_age)
            + self.application.snapshots().prune_finished(max_age)
    }

    /// Snapshots currently held across all three graphs.
    pub fn snapshot_count(&self) -> usize {
        self.preparation.snapshots().len()
            + self.retry.snapshots().len()
            + self.application.snapshots().len()
    }
}
