//! Test harness for running the orchestrator in isolation.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use jobflow::config::schema::Config;
use jobflow::worker::RunReport;
use jobflow::{InMemoryJobRepository, JobOrchestrator, JobRepository, SqliteJobRepository};

use super::builders::{profile, ConfigBuilder};

/// How long a test waits for a single run before giving up.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns a temporary directory holding the database and rendered documents.
pub struct TestHarness {
    pub temp_dir: TempDir,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = temp_dir.path().join("generated");
        let db_path = temp_dir.path().join("jobflow.db");

        Self {
            temp_dir,
            output_dir,
            db_path,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Memory-backed config pointed at this harness's output directory.
    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new().output_directory(&self.output_dir.display().to_string())
    }

    /// Same as [`config`](Self::config) but backed by this harness's SQLite file.
    pub fn sqlite_config(&self) -> ConfigBuilder {
        self.config().sqlite(&self.db_path.display().to_string())
    }

    /// Builds an orchestrator with the test profile injected.
    pub fn orchestrator(&self, config: Config) -> JobOrchestrator {
        JobOrchestrator::builder(config)
            .profile(profile())
            .build()
            .expect("Failed to build orchestrator")
    }

    /// Builds an orchestrator over a caller-owned repository.
    pub fn orchestrator_with(
        &self,
        config: Config,
        repository: Arc<dyn JobRepository>,
    ) -> JobOrchestrator {
        JobOrchestrator::builder(config)
            .repository(repository)
            .profile(profile())
            .build()
            .expect("Failed to build orchestrator")
    }

    /// Waits for a run and fails the test if it does not finish in time.
    pub fn wait(&self, orchestrator: &JobOrchestrator, run_id: &str) -> RunReport {
        orchestrator
            .wait_for_run(run_id, RUN_TIMEOUT)
            .unwrap_or_else(|| panic!("run {} did not finish within {:?}", run_id, RUN_TIMEOUT))
    }

    /// One initialized repository per backend, labelled for assertion messages.
    pub fn repository_backends(&self) -> Vec<(&'static str, Arc<dyn JobRepository>)> {
        let memory: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let sqlite: Arc<dyn JobRepository> = Arc::new(
            SqliteJobRepository::open(&self.db_path).expect("Failed to open SQLite repository"),
        );
        for repository in [&memory, &sqlite] {
            repository.initialize().expect("Failed to initialize repository");
        }
        vec![("memory", memory), ("sqlite", sqlite)]
    }

    /// Uninitialized repositories, for lifecycle tests.
    pub fn fresh_backends(&self) -> Vec<(&'static str, Arc<dyn JobRepository>)> {
        let memory: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let sqlite: Arc<dyn JobRepository> = Arc::new(
            SqliteJobRepository::open(&self.temp_dir.path().join("fresh.db"))
                .expect("Failed to open SQLite repository"),
        );
        vec![("memory", memory), ("sqlite", sqlite)]
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
