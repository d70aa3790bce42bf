use thiserror::Error;

/// Errors that can occur when interacting with the index store.
#[derive(Debug, Error)]
pub enum IndexStoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("Index store unavailable: {0}")]
    Unavailable(String),

    /// A Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The item id cannot be used as a record key.
    #[error("Invalid item id: {0:?}")]
    InvalidKey(String),
}

impl IndexStoreError {
    /// Returns true for failures a later retry may succeed on.
    pub fn is_transient(&self) -> bool {
        !matches!(self, IndexStoreError::InvalidKey(_))
    }
}

/// Result type for index store operations.
pub type Result<T> = std::result::Result<T, IndexStoreError>;
