use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod environment;
pub mod keys;
pub mod queues;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use environment::Environment;
pub use queues::{JobKind, JobState, QueueFamily, QueueRole};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown environment: {0}")]
    InvalidEnvironment(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
