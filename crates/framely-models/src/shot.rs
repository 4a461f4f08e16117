//! Shots and their analysis bundles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::detection::{AudioStats, DetectorResult, ObjectDetection, ReasoningOutput, StagePayload};
use crate::error::{ModelError, ModelResult};
use crate::stage::Stage;

/// Degradation applied to a shot's configuration after resource exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DegradationFlag {
    /// Segmentation refinement was disabled
    Sam2Off,
    /// Super-resolution was disabled
    SrOff,
    /// The reasoning frame context was halved
    QwenCtxShrink,
}

impl DegradationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationFlag::Sam2Off => "sam2_off",
            DegradationFlag::SrOff => "sr_off",
            DegradationFlag::QwenCtxShrink => "qwen_ctx_shrink",
        }
    }
}

impl fmt::Display for DegradationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to an extracted frame on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRef {
    /// Absolute frame index in the video
    pub index: u64,
    pub path: String,
}

impl FrameRef {
    pub fn new(index: u64, path: impl Into<String>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }
}

/// A contiguous frame range and everything the pipeline learned about it.
///
/// The pipeline mutates a shot in place while it runs; once a shot is placed
/// in a report it is read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    pub shot_id: String,
    /// Position in the video, zero-based
    pub index: usize,
    pub start_frame: u64,
    /// Exclusive end frame
    pub end_frame: u64,
    pub fps: f64,
    #[serde(default)]
    pub frames: Vec<FrameRef>,
    #[serde(default)]
    pub detectors: BTreeMap<Stage, DetectorResult>,
    #[serde(default)]
    pub flags: Vec<DegradationFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Shot {
    /// Create a shot covering `[start_frame, end_frame)`.
    pub fn new(index: usize, start_frame: u64, end_frame: u64, fps: f64) -> ModelResult<Self> {
        if end_frame <= start_frame {
            return Err(ModelError::invalid_shot(format!(
                "shot {} has empty frame range {}..{}",
                index, start_frame, end_frame
            )));
        }
        if fps.is_nan() || fps <= 0.0 {
            return Err(ModelError::invalid_shot(format!(
                "shot {} has non-positive fps {}",
                index, fps
            )));
        }

        Ok(Self {
            shot_id: Self::id_for(index),
            index,
            start_frame,
            end_frame,
            fps,
            frames: Vec::new(),
            detectors: BTreeMap::new(),
            flags: Vec::new(),
            reasoning: None,
            warnings: Vec::new(),
        })
    }

    /// Canonical shot id for an index (`sh_000`, `sh_001`, ...).
    pub fn id_for(index: usize) -> String {
        format!("sh_{:03}", index)
    }

    pub fn with_frames(mut self, frames: Vec<FrameRef>) -> Self {
        self.frames = frames;
        self
    }

    pub fn frame_count(&self) -> u64 {
        self.end_frame.saturating_sub(self.start_frame)
    }

    pub fn duration_s(&self) -> f64 {
        self.frame_count() as f64 / self.fps
    }

    pub fn start_s(&self) -> f64 {
        self.start_frame as f64 / self.fps
    }

    pub fn end_s(&self) -> f64 {
        self.end_frame as f64 / self.fps
    }

    pub fn result(&self, stage: Stage) -> Option<&DetectorResult> {
        self.detectors.get(&stage)
    }

    pub fn has_flag(&self, flag: DegradationFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Record a flag once.
    pub fn add_flag(&mut self, flag: DegradationFlag) {
        if !self.has_flag(flag) {
            self.flags.push(flag);
        }
    }

    /// Most refined object stage that ran successfully.
    pub fn object_stage(&self) -> Option<Stage> {
        Stage::OBJECT_PRECEDENCE.iter().copied().find(|stage| {
            self.detectors
                .get(stage)
                .is_some_and(|r| !r.is_degraded() && r.payload.objects().is_some())
        })
    }

    /// Best available object list (see [`Shot::object_stage`]).
    pub fn objects(&self) -> Option<&[ObjectDetection]> {
        self.object_stage()
            .and_then(|stage| self.detectors.get(&stage))
            .and_then(|result| result.payload.objects())
    }

    pub fn objects_mut(&mut self) -> Option<&mut Vec<ObjectDetection>> {
        let stage = self.object_stage()?;
        self.detectors
            .get_mut(&stage)
            .and_then(|result| result.payload.objects_mut())
    }

    /// Mean brightness, 0.5 when color analysis did not run.
    pub fn brightness(&self) -> f64 {
        match self.detectors.get(&Stage::ColorComp).map(|r| &r.payload) {
            Some(StagePayload::Color(stats)) => stats.brightness,
            _ => 0.5,
        }
    }

    /// Reasoned mood, "neutral" when reasoning did not produce one.
    pub fn mood(&self) -> &str {
        self.reasoning
            .as_ref()
            .and_then(|r| r.mood())
            .unwrap_or("neutral")
    }

    pub fn camera_motion(&self) -> bool {
        match self.detectors.get(&Stage::MotionSaliency).map(|r| &r.payload) {
            Some(StagePayload::Motion(stats)) => stats.camera_motion,
            _ => false,
        }
    }

    pub fn audio(&self) -> Option<&AudioStats> {
        match self.detectors.get(&Stage::AudioEng).map(|r| &r.payload) {
            Some(StagePayload::Audio(stats)) => Some(stats),
            _ => None,
        }
    }

    /// Clear pipeline output so the shot can be analyzed again from scratch.
    ///
    /// Flags survive: they describe the configuration of the next attempt.
    pub fn reset_analysis(&mut self) {
        self.detectors.clear();
        self.reasoning = None;
        self.warnings.clear();
    }
}
