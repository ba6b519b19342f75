//! Error taxonomy for exact search.

use crate::cursor::DocId;
use crate::kernels::VectorError;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The field has no vector data in this segment. The orchestrator turns
    /// this into an empty result rather than surfacing it.
    #[error("field not found in segment: {field}")]
    FieldNotFound { field: String },

    #[error("unsupported comparison: {0}")]
    UnsupportedComparison(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed quantized data for doc {doc}: expected {expected} bytes, got {got}")]
    MalformedQuantizedData {
        doc: DocId,
        expected: usize,
        got: usize,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedComparison(message.into())
    }
}

impl From<VectorError> for SearchError {
    fn from(error: VectorError) -> Self {
        Self::InvalidArgument(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
