//! Error types for dataset access.

use thiserror::Error;

/// Errors that can occur while opening or reading a dataset.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Failed to open the dataset (store unreachable, missing or malformed
    /// consolidated metadata).
    #[error("failed to open dataset: {0}")]
    OpenFailed(String),

    /// Failed to read data from an array.
    #[error("failed to read dataset: {0}")]
    ReadFailed(String),

    /// A requested variable does not exist in the dataset.
    #[error("variable not found: {0}")]
    MissingVariable(String),

    /// Metadata was present but could not be interpreted.
    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(String),
}

impl DatasetError {
    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;
