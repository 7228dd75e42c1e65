use std::path::Path;

use log::{info, warn};

use crate::config::schema::{Config, RepositoryBackend};
use crate::error::ConfigError;
use crate::model::Document;

pub const SUPPORTED_VERSION: &str = "1.0";

/// Overrides the repository file path.
pub const ENV_DATABASE_PATH: &str = "JOBFLOW_DATABASE_PATH";
/// Overrides the rendered document directory.
pub const ENV_OUTPUT_DIR: &str = "JOBFLOW_OUTPUT_DIR";
/// Overrides the worker count.
pub const ENV_WORKERS: &str = "JOBFLOW_WORKERS";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::validation(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.worker_count == 0 {
        return Err(ConfigError::validation("worker_count must be at least 1"));
    }

    if config.graph.max_steps == 0 {
        return Err(ConfigError::validation("graph.max_steps must be at least 1"));
    }

    if config.output_directory.trim().is_empty() {
        return Err(ConfigError::validation("output_directory must not be empty"));
    }

    if config.template_name.trim().is_empty() {
        return Err(ConfigError::validation("template_name must not be empty"));
    }

    let retention = &config.retention;
    if retention.older_than_days < 1 {
        return Err(ConfigError::validation(
            "retention.older_than_days must be at least 1",
        ));
    }
    if retention.statuses.is_empty() {
        return Err(ConfigError::validation(
            "retention.statuses must name at least one status",
        ));
    }
    if let Some(status) = retention.statuses.iter().find(|s| !s.is_terminal()) {
        return Err(ConfigError::validation(format!(
            "retention.statuses may only contain terminal statuses, got '{}'",
            status
        )));
    }
    if retention.max_reports < 1 {
        return Err(ConfigError::validation(
            "retention.max_reports must be at least 1",
        ));
    }

    if config.repository.backend == RepositoryBackend::Sqlite {
        match &config.repository.path {
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError::validation("repository.path must not be empty"));
            }
            Some(_) => {}
            None if config.repository.resolved_path().is_none() => {
                return Err(ConfigError::validation(
                    "repository.path is required when no home directory is available",
                ));
            }
            None => {}
        }
    }

    Ok(())
}

/// Applies `JOBFLOW_*` environment overrides, then re-validates.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(path) = var(ENV_DATABASE_PATH) {
        info!("Using database path from {}", ENV_DATABASE_PATH);
        config.repository.path = Some(path.trim().to_string());
    }

    if let Some(dir) = var(ENV_OUTPUT_DIR) {
        info!("Using output directory from {}", ENV_OUTPUT_DIR);
        config.output_directory = dir.trim().to_string();
    }

    if let Some(workers) = var(ENV_WORKERS) {
        config.worker_count = workers.trim().parse().map_err(|_| {
            ConfigError::validation(format!(
                "{} must be a positive integer, got '{}'",
                ENV_WORKERS, workers
            ))
        })?;
    }

    validate_config(config)
}

/// Reads the candidate's master profile.
pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<Document, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let profile: Document = serde_json::from_str(&content)?;

    if profile.contact.full_name.trim().is_empty() {
        warn!("Profile at {} has no contact name", crate::sanitize::redact_path(path));
    }
    Ok(profile)
}
