//! Error taxonomy shared by the store, the curation service and the scheduler.
//!
//! The HTTP collaborator maps these to status codes via [`PulseError::status_code`].

use std::time::Duration;
use thiserror::Error;

/// Failure while fetching or parsing one source. Recovered locally by the
/// curation cycle (the source is skipped), never surfaced as a cycle failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed feed: {0}")]
    Parse(String),
    #[error("unsupported endpoint: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("card {0} already exists with different content")]
    Conflict(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("shutdown exceeded grace period of {0:?}")]
    Timeout(Duration),

    #[error("invalid value: {0}")]
    Validation(String),

    #[error("store i/o: {0}")]
    Storage(#[from] std::io::Error),

    #[error("store encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PulseError>;

impl PulseError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// HTTP-style status for the API layer.
    pub fn status_code(&self) -> u16 {
        match self {
            PulseError::NotFound { .. } => 404,
            PulseError::Conflict(_) => 409,
            PulseError::Validation(_) => 400,
            PulseError::Fetch(_) | PulseError::Timeout(_) => 503,
            PulseError::Storage(_) | PulseError::Encoding(_) => 500,
        }
    }
}
