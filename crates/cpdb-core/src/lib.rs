pub mod accounts;
pub mod app_config;
pub mod config;

use thiserror::Error;

pub use accounts::{
    normalize_handle, FetchedPost, PostRecord, ProfileSnapshot, TrackedAccount,
    MAX_ACTIVITY_SCORE,
};
pub use app_config::{AppConfig, CollectorSettings, Environment, QuotaMode};
pub use config::{load_app_config, load_app_config_from_env};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid handle \"{0}\": expected 1-15 characters of [A-Za-z0-9_]")]
    InvalidHandle(String),
}
