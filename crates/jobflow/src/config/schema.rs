use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{ApplicationType, JobStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Where rendered documents are written.
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    /// The candidate's master profile (a `Document` as JSON).
    #[serde(default = "default_profile_path")]
    pub profile_path: String,
    #[serde(default = "default_template_name")]
    pub template_name: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_output_directory() -> String {
    "./data/generated".to_string()
}

fn default_profile_path() -> String {
    "./data/profile.json".to_string()
}

fn default_template_name() -> String {
    "modern".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            output_directory: default_output_directory(),
            profile_path: default_profile_path(),
            template_name: default_template_name(),
            worker_count: default_worker_count(),
            repository: RepositoryConfig::default(),
            graph: GraphConfig::default(),
            filter: FilterConfig::default(),
            application: ApplicationConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub backend: RepositoryBackend,
    /// SQLite database file. Falls back to `~/.jobflow/data/jobflow.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RepositoryConfig {
    /// The database file to open, if any can be determined.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match &self.path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_max_steps() -> usize {
    crate::graph::DEFAULT_MAX_STEPS
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

/// Suitability filtering for feed-sourced postings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub require_remote: bool,
    #[serde(default)]
    pub excluded_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Used when neither the decision nor the record names one.
    #[serde(default)]
    pub default_type: ApplicationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_older_than_days")]
    pub older_than_days: u32,
    #[serde(default = "default_retention_statuses")]
    pub statuses: Vec<JobStatus>,
    /// Minutes a finished run's snapshot stays queryable.
    #[serde(default = "default_run_history_minutes")]
    pub run_history_minutes: u32,
    /// Finished-run reports kept for `wait_for_run`; oldest go first.
    #[serde(default = "default_max_reports")]
    pub max_reports: usize,
}

fn default_older_than_days() -> u32 {
    90
}

fn default_retention_statuses() -> Vec<JobStatus> {
    vec![JobStatus::Declined, JobStatus::Failed]
}

fn default_run_history_minutes() -> u32 {
    60
}

fn default_max_reports() -> usize {
    1024
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            older_than_days: default_older_than_days(),
            statuses: default_retention_statuses(),
            run_history_minutes: default_run_history_minutes(),
            max_reports: default_max_reports(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
