//! Coverage metrics and quality gate decisions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much of each frame the detectors could see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpatialCoverage {
    pub tile_size: u32,
    pub stride: u32,
    /// Whether any shot used super-resolution
    pub sr_used: bool,
    pub pixels_covered_pct: f64,
    /// Smallest object size (px) the detectors are expected to find
    pub min_detectable_px: f64,
}

/// How much of the video's timeline was analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemporalCoverage {
    pub frame_stride: u32,
    pub frames_analyzed_pct: f64,
}

/// Completeness of the audio measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioCoverage {
    pub lufs_trace_pct: f64,
    pub stoi_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageReport {
    pub spatial: SpatialCoverage,
    pub temporal: TemporalCoverage,
    pub audio: AudioCoverage,
}

/// Overall quality state. Ordered from best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Ok,
    Degraded,
    Failed,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Ok => "ok",
            GateState::Degraded => "degraded",
            GateState::Failed => "failed",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason code attached to a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    LowTemporalCoverage,
    MinDetectablePxTooLarge,
    LufsTraceMissing,
    LowStoiCoverage,
    ShotAnalysisFailed,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::LowTemporalCoverage => "low_temporal_coverage",
            GateReason::MinDetectablePxTooLarge => "min_detectable_px_too_large",
            GateReason::LufsTraceMissing => "lufs_trace_missing",
            GateReason::LowStoiCoverage => "low_stoi_coverage",
            GateReason::ShotAnalysisFailed => "shot_analysis_failed",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quality state plus the ordered reasons that produced it.
///
/// Reasons only accumulate and the state only worsens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GateDecision {
    pub state: GateState,
    pub reasons: Vec<GateReason>,
}

impl GateDecision {
    pub fn ok() -> Self {
        Self::default()
    }

    /// Record a violation, moving the state to at least `state`.
    pub fn escalate(&mut self, state: GateState, reason: GateReason) {
        self.state = self.state.max(state);
        self.reasons.push(reason);
    }

    pub fn is_ok(&self) -> bool {
        self.state == GateState::Ok
    }

    pub fn has_reason(&self, reason: GateReason) -> bool {
        self.reasons.contains(&reason)
    }
}
