//! Progress module for checkpointing harvest runs
//!
//! This module handles:
//! - The `ProgressState` value (completed pages, completed and abandoned units)
//! - Loading and crash-atomic saving of the JSON checkpoint file
//! - Re-queuing pages whose units failed permanently

mod state;
mod store;

pub use state::ProgressState;
pub use store::ProgressStore;

use thiserror::Error;

/// Errors that can occur while loading or saving progress
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Progress file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },

    #[error("Failed to serialize progress: {0}")]
    Serialize(serde_json::Error),
}

/// Result type for progress operations
pub type ProgressResult<T> = Result<T, ProgressError>;
