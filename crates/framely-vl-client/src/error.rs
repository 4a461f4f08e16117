//! VL client error types.

use thiserror::Error;

pub type VlResult<T> = Result<T, VlError>;

#[derive(Debug, Error)]
pub enum VlError {
    #[error("Reasoning service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to parse JSON")]
    Parse { raw: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VlError {
    pub fn is_retryable(&self) -> bool {
        match self {
            VlError::ServiceUnavailable(_) => true,
            VlError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Raw model output, when the failure was an unparseable answer.
    pub fn raw(&self) -> Option<&str> {
        match self {
            VlError::Parse { raw } => Some(raw),
            _ => None,
        }
    }
}
