use thiserror::Error;

use crate::storage::WorkLine;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Malformed selection: {0}")]
    MalformedSelection(String),
    #[error("Unknown lemma: {0}")]
    UnknownLemma(String),
    #[error("Could not compile pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
    #[error("Execution error on {table}: {message}")]
    Execution {
        table: String,
        message: String,
        collected: Vec<WorkLine>,
    },
    #[error("Malformed request: {0}")]
    Input(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

// Helper conversions
impl From<rusqlite::Error> for SearchError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for SearchError {
    fn from(e: r2d2::Error) -> Self {
        Self::Storage(format!("connection pool: {e}"))
    }
}

impl From<config::ConfigError> for SearchError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Input(e.to_string())
    }
}

impl From<tokio::task::JoinError> for SearchError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Invariant(format!("worker join failed: {e}"))
    }
}
