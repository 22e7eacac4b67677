//! Result sink traits and types
//!
//! This module defines the trait interface for result sinks and the record
//! type they persist.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while writing results
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Output {path} has columns {found:?}, expected {expected:?}")]
    SchemaMismatch {
        path: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Output schema must have at least one column")]
    EmptySchema,

    #[error("Sink lock poisoned by a panicked writer")]
    Poisoned,
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// One flattened output row, keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRecord {
    fields: BTreeMap<String, String>,
}

impl ResultRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Values in schema order; columns the record lacks come out empty
    pub fn project<'a>(&'a self, schema: &[String]) -> Vec<&'a str> {
        schema
            .iter()
            .map(|column| self.get(column).unwrap_or(""))
            .collect()
    }
}

impl From<BTreeMap<String, String>> for ResultRecord {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

/// Trait for result sinks
///
/// Sinks are append-only: a record, once written, is never rewritten or
/// reordered. The schema is fixed when the sink is opened. Implementations
/// must be safe to call from several in-flight fetches at once.
pub trait ResultSink: Send + Sync {
    /// Column order every record is written in
    fn schema(&self) -> &[String];

    /// Durably appends one record
    fn append(&self, record: &ResultRecord) -> SinkResult<()>;
}
