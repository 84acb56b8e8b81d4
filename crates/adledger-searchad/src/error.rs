//! Error types for the ad platform API client.

use thiserror::Error;

/// Errors returned by [`SearchAdClient`](crate::SearchAdClient).
#[derive(Error, Debug)]
pub enum SearchAdError {
    /// The platform rejected the credentials (401/403)
    #[error("credentials rejected with status {status}")]
    AuthRejected {
        /// HTTP status code
        status: u16,
    },

    /// Non-retryable API failure
    #[error("API error: status {status}, {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Transport failure that is not a timeout
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential blob missing fields or unparseable
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl SearchAdError {
    /// Whether the error means the connection needs re-authorisation.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

/// Result type alias for API client operations.
pub type Result<T> = std::result::Result<T, SearchAdError>;
