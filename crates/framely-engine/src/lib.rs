//! Video analysis orchestration engine.
//!
//! This crate provides:
//! - The stage graph and the bounded accelerator pool
//! - The per-shot pipeline with its fallback ladder and single retry
//! - Per-shot object tracking
//! - Scene assembly, coverage metrics and the quality gate
//! - Risk detection and the run coordinator producing the final report
//! - Configuration loading, structured logging and metrics

pub mod config;
pub mod coordinator;
pub mod coverage;
pub mod detector;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reasoning;
pub mod resource_pool;
pub mod risks;
pub mod scenes;
pub mod stage_graph;
pub mod stats;
pub mod tracking;

pub use config::EngineConfig;
pub use coordinator::{PreparedVideo, Preparer, RunCoordinator, RunRequest};
pub use coverage::{compute_coverage, evaluate_gate};
pub use detector::{Detector, DetectorSet, StageContext};
pub use error::{DetectorError, RunError, RunResult, ShotError, ShotResult};
pub use logging::RunLogger;
pub use metrics::RunMetrics;
pub use pipeline::ShotPipeline;
pub use reasoning::ReasoningService;
pub use resource_pool::{PoolPermit, ResourcePool};
pub use scenes::assemble;
pub use stage_graph::{Phase, ResourceClass, StageGraph};
pub use tracking::{TrackKey, TrackState};
