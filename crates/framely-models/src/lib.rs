//! Shared data models for the Framely analysis engine.
//!
//! This crate provides Serde-serializable types for:
//! - Analysis stages and the analysis configuration
//! - Shots, detector payloads and provenance
//! - Scenes and their aggregated features
//! - Coverage metrics and gate decisions
//! - The final analysis report

pub mod config;
pub mod coverage;
pub mod detection;
pub mod error;
pub mod provenance;
pub mod report;
pub mod scene;
pub mod shot;
pub mod stage;
pub mod video;

// Re-export common types
pub use config::{
    AblationFlags, AnalysisConfig, AudioConfig, CoverageThresholds, DetectConfig, FallbackStep,
    RuntimeConfig, SceneConfig, ShotFailurePolicy, TrackConfig,
};
pub use coverage::{
    AudioCoverage, CoverageReport, GateDecision, GateReason, GateState, SpatialCoverage,
    TemporalCoverage,
};
pub use detection::{
    AudioStats, BoundingBox, ColorStats, DetectorResult, DialogueStats, FaceDetection,
    MotionStats, ObjectDetection, ReasoningOutput, StagePayload, TextRegion, TransitionInfo,
};
pub use error::{ModelError, ModelResult};
pub use provenance::{params_hash, sha256_hex, Provenance};
pub use report::{
    Calibration, DetectionSummary, GlobalStats, Report, ReportStatus, Resolution, Risk,
    RiskSeverity, RunMetricsSnapshot, TrackSummary, VideoInfo, SCHEMA_VERSION,
};
pub use scene::{Scene, SceneAudio, SceneFeatures};
pub use shot::{DegradationFlag, FrameRef, Shot};
pub use stage::Stage;
pub use video::VideoMetadata;
