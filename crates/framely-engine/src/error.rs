//! Engine error types.

use std::path::PathBuf;

use framely_models::ModelError;
use thiserror::Error;

pub type DetectResult<T> = Result<T, DetectorError>;
pub type ShotResult<T> = Result<T, ShotError>;
pub type RunResult<T> = Result<T, RunError>;

/// Failure reported by a detector.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    /// The accelerator ran out of capacity
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Detector failed: {0}")]
    Failed(String),
}

impl DetectorError {
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// True for accelerator exhaustion, including out-of-memory failures
    /// reported through the generic variant.
    pub fn is_resource_exhaustion(&self) -> bool {
        match self {
            DetectorError::ResourceExhausted(_) => true,
            DetectorError::Failed(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("out of memory") || msg.contains("cuda oom")
            }
        }
    }
}

/// Failure of a whole shot.
#[derive(Debug, Clone, Error)]
pub enum ShotError {
    #[error("Shot {shot_id} exhausted the accelerator after {attempts} attempts")]
    ResourceExhausted { shot_id: String, attempts: u32 },

    #[error("Resource pool closed")]
    PoolClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShotError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, ShotError::ResourceExhausted { .. })
    }
}

impl From<tokio::sync::AcquireError> for ShotError {
    fn from(_: tokio::sync::AcquireError) -> Self {
        ShotError::PoolClosed
    }
}

/// Failure of a run. A failed run produces no report.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Source video not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Preparation produced no shots for video {0}")]
    NoShots(String),

    #[error("Preparation failed: {0}")]
    Preparation(String),

    #[error("Shot analysis failed: {0}")]
    Shot(#[from] ShotError),

    #[error("Configuration error: {0}")]
    Config(#[from] ModelError),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunError {
    pub fn preparation(msg: impl Into<String>) -> Self {
        Self::Preparation(msg.into())
    }

    /// Errors caused by the input or environment rather than a single shot.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RunError::Shot(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhaustion_detection() {
        assert!(DetectorError::resource_exhausted("gpu full").is_resource_exhaustion());
        assert!(DetectorError::failed("CUDA error: out of memory").is_resource_exhaustion());
        assert!(!DetectorError::failed("corrupt frame").is_resource_exhaustion());
    }

    #[test]
    fn test_run_error_classification() {
        assert!(RunError::NoShots("v1".into()).is_fatal());
        let shot = RunError::from(ShotError::ResourceExhausted {
            shot_id: "sh_000".into(),
            attempts: 2,
        });
        assert!(!shot.is_fatal());
        assert!(shot.to_string().contains("sh_000"));
    }
}
