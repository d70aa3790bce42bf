//! Contract decoding errors.

use thiserror::Error;

/// Errors raised while decoding or validating an inbound event payload.
///
/// None of these can be fixed by redelivering the same bytes.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The payload is not valid JSON or does not match the contract shape.
    #[error("Malformed {event_type} payload: {source}")]
    Json {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A required field is present but empty.
    #[error("Malformed {event_type} payload: field `{field}` must not be blank")]
    BlankField {
        event_type: &'static str,
        field: &'static str,
    },

    /// The producer used a schema version this consumer does not understand.
    #[error("Unsupported {event_type} schema version {version} (expected {expected})")]
    UnsupportedVersion {
        event_type: &'static str,
        version: u16,
        expected: u16,
    },
}

/// Result type for contract operations.
pub type Result<T> = std::result::Result<T, ContractError>;
