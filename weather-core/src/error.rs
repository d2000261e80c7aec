//! Error types surfaced by the sync core.

use thiserror::Error;

/// Failure to obtain a usable snapshot from a remote provider.
///
/// Always fatal to the `load_weather` call that hit it; the scheduler's next
/// tick is the only retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid weather data: {0}")]
    InvalidData(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::InvalidData(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::InvalidData(err.to_string())
    }
}

/// Read or write failure against the record store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("value cannot be stored: {0}")]
    Unrepresentable(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}
