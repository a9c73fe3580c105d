//! Error types for the client library.

use qbtable_common::{ConfigError, FieldId};
use thiserror::Error;

/// Errors that can occur when talking to the backend.
///
/// Transport failures are deliberately absent: a backend that cannot be
/// reached yields [`qbtable_common::Outcome::Unreachable`] instead of an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Client configuration issue.
    ///
    /// Missing table id or realm, unparsable base URL, or a bad endpoint.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The caller asked for something the client refuses to send.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected or malformed backend response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The backend kept rejecting the request after every permitted retry.
    ///
    /// Carries the status code of the last attempt.
    #[error("Request failed with status {status} after {attempts} attempt(s)")]
    RetriesExhausted {
        /// HTTP status of the last response.
        status: u16,
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// A record referenced a field missing from the response's field list.
    #[error("Record {record_index} references unknown field {field_id}")]
    UnknownField {
        /// Position of the offending record in the response.
        record_index: usize,
        /// The unknown field id.
        field_id: FieldId,
    },

    /// The table has no field flagged as primary key.
    #[error("Table {0} has no primary key field")]
    MissingPrimaryKey(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigurationError(err.to_string())
    }
}

impl ClientError {
    /// HTTP status of the last attempt, when the retry budget ran out.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RetriesExhausted { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the retry budget was exhausted.
    #[must_use]
    pub const fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Check if the backend's data was internally inconsistent.
    #[must_use]
    pub const fn is_data_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::UnknownField { .. } | Self::InvalidResponse(_) | Self::SerializationError(_)
        )
    }

    /// Check if the caller cancelled the request.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;
