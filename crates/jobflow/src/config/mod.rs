pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_config, load_config_from_str, load_profile, validate_config};
pub use schema::{
    ApplicationConfig, Config, FilterConfig, GraphConfig, LogFormat, LoggingConfig,
    RepositoryBackend, RepositoryConfig, RetentionConfig,
};
