//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid shot: {0}")]
    InvalidShot(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn invalid_shot(msg: impl Into<String>) -> Self {
        Self::InvalidShot(msg.into())
    }
}
