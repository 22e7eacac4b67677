//! Page-Harvest: a resumable, checkpointed pagination harvester
//!
//! This crate walks a paginated listing page by page, fetches the documents each
//! page refers to with bounded concurrency, appends one row per document to an
//! output dataset, and checkpoints its progress after every page so that an
//! interrupted run can be resumed without re-downloading finished work.

pub mod config;
pub mod fetch;
pub mod harvest;
pub mod progress;
pub mod sink;

use thiserror::Error;

/// Main error type for Page-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Progress store error: {0}")]
    Progress(#[from] progress::ProgressError),

    #[error("Result sink error: {0}")]
    Sink(#[from] sink::SinkError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Missing credentials: environment variable {var} is not set")]
    MissingCredentials { var: String },

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Page-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{FetchError, FetchRequest, Fetcher, RawPayload};
pub use harvest::{HarvestSummary, Harvester, RunOutcome, WorkUnit};
pub use progress::{ProgressState, ProgressStore};
pub use sink::{ResultRecord, ResultSink};
