//! Projection error types.

use thiserror::Error;

/// Errors that can occur while applying an event to the index.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The index store failed; the event may succeed on redelivery.
    #[error("Index store error: {0}")]
    Store(#[from] index_store::IndexStoreError),

    /// The payload can never be applied, no matter how often it is redelivered.
    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] contracts::ContractError),
}

impl ProjectionError {
    /// Returns true if the triggering message should be redelivered.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProjectionError::Store(err) => err.is_transient(),
            ProjectionError::MalformedEvent(_) => false,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
