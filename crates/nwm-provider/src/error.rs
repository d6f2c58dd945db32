//! Provider error taxonomy.
//!
//! The distinction between [`ProviderError::Query`] (caller mistake) and
//! [`ProviderError::NoData`] (valid query, empty result) is load-bearing:
//! hosting frameworks map them to different HTTP statuses, and tests
//! assert on which side of the line each failure falls.

use zarr_dataset::DatasetError;

/// Errors raised by the query pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The caller's query is invalid (missing datetime filter, degenerate
    /// range, bad pagination arguments).
    #[error("invalid query: {0}")]
    Query(String),

    /// The query was valid but selects no data.
    #[error("no data found: {0}")]
    NoData(String),

    /// Dataset metadata is present but unusable (unparsable CRS attribute,
    /// undecodable time units).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A requested or required variable does not exist in the dataset.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// The operation is not supported for this provider configuration.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Storage or load failure after the query itself validated.
    #[error("data access failed: {0}")]
    DataAccess(String),
}

impl ProviderError {
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn no_data(msg: impl Into<String>) -> Self {
        Self::NoData(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// HTTP status equivalent, for hosting frameworks.
    pub fn status_code(&self) -> u16 {
        match self {
            ProviderError::Query(_) => 400,
            ProviderError::NoData(_) => 404,
            ProviderError::FieldNotFound(_) => 400,
            ProviderError::InvalidData(_) => 500,
            ProviderError::NotImplemented(_) => 501,
            ProviderError::DataAccess(_) => 500,
        }
    }
}

impl From<DatasetError> for ProviderError {
    fn from(err: DatasetError) -> Self {
        match err {
            // Open failures surface as no-data so a transient store outage
            // reads as an empty collection, not a server fault.
            DatasetError::OpenFailed(msg) => ProviderError::NoData(msg),
            DatasetError::MissingVariable(name) => ProviderError::FieldNotFound(name),
            DatasetError::InvalidMetadata(msg) => ProviderError::InvalidData(msg),
            DatasetError::ReadFailed(msg) => ProviderError::DataAccess(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
