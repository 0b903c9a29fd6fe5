//! Error types for brainsearch.

use thiserror::Error;

/// Errors that can occur while building or querying a brain database.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Fatal configuration error: invalid patch shape, missing hashing
    /// parameters, vector-length mismatch, unset distance metric, or a
    /// nonexistent database name.
    #[error("configuration error: {0}")]
    Config(String),

    /// Recoverable per-subject data error (volume failed to load, no valid
    /// patches). Batch drivers skip the subject and tally the failure.
    #[error("data error: {0}")]
    Data(String),

    /// I/O error from database persistence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or config (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
