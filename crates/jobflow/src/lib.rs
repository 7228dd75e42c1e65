pub mod broadcast;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod model;
pub mod orchestrator;
pub mod repository;
pub mod runs;
pub mod sanitize;
pub mod telemetry;
pub mod worker;
pub mod workflows;

pub use broadcast::{RunProgressBroadcaster, RunProgressEvent};
pub use collaborators::Collaborators;
pub use config::{apply_env_overrides, load_config, load_profile, Config};
pub use error::{ConfigError, JobflowError, OrchestratorError, Result, WorkerError};
pub use graph::{CompiledGraph, GraphBuilder, GraphError, GraphState, NodeError};
pub use model::{JobMode, JobRecord, JobSource, JobStatus};
pub use orchestrator::{Decision, JobOrchestrator, RetainedRuns, Submission};
pub use repository::{InMemoryJobRepository, JobRepository, JobUpdate, SqliteJobRepository};
pub use runs::RunRegistry;
pub use workflows::{WorkflowKind, Workflows};
