//! Error type for the backend client.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Backend { status: StatusCode, message: String },

    #[error("not signed in")]
    NotSignedIn,

    #[error("session expired")]
    SessionExpired,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Backend { status, .. } => Some(*status),
            ApiError::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Whether the failure came from the transport rather than the backend.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Http(e) if e.is_connect() || e.is_timeout())
    }
}
