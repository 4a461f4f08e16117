//! Detector payloads.
//!
//! Each stage produces a domain-specific payload wrapped in a shared
//! provenance envelope. Payload structs carry their well-known fields as
//! typed members and keep anything else a detector reports in `extra`, so new
//! detector fields never require a schema change here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provenance::Provenance;
use crate::stage::Stage;

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectDetection {
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    /// Frame index the detection belongs to
    pub frame: u64,
    /// Stable identity assigned by the tracker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectDetection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BoundingBox, frame: u64) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
            frame,
            track_id: None,
            extra: Map::new(),
        }
    }
}

/// A detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FaceDetection {
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub frame: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A recognized text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextRegion {
    pub text: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Color and composition statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColorStats {
    /// Mean brightness on a [0, 1] scale
    pub brightness: f64,
    /// Mean saturation on a [0, 1] scale
    pub saturation: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dominant_colors: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ColorStats {
    fn default() -> Self {
        Self {
            brightness: 0.5,
            saturation: 0.5,
            dominant_colors: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Camera motion and saliency summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MotionStats {
    pub camera_motion: bool,
    pub motion_type: String,
    pub magnitude: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for MotionStats {
    fn default() -> Self {
        Self {
            camera_motion: false,
            motion_type: "static".to_string(),
            magnitude: 0.0,
            extra: Map::new(),
        }
    }
}

/// Transition at the start of a shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransitionInfo {
    pub transition_type: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TransitionInfo {
    fn default() -> Self {
        Self {
            transition_type: "cut".to_string(),
            confidence: 0.0,
            extra: Map::new(),
        }
    }
}

/// Dialogue intelligibility measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DialogueStats {
    /// Short-time objective intelligibility, [0, 1]
    pub stoi: f64,
    pub intelligibility: String,
}

/// Audio engineering metrics for the shot's time span.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct AudioStats {
    /// Integrated loudness; `None` when no loudness trace was measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lufs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_peak_dbtp: Option<f64>,
    #[serde(default)]
    pub has_speech: bool,
    #[serde(default)]
    pub has_music: bool,
    /// Present only when intelligibility was measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<DialogueStats>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Stage-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Objects { objects: Vec<ObjectDetection> },
    Faces { faces: Vec<FaceDetection> },
    Text { regions: Vec<TextRegion> },
    Color(ColorStats),
    Motion(MotionStats),
    Transition(TransitionInfo),
    Audio(AudioStats),
    SuperRes {
        sr_used: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<u32>,
    },
    /// Free-form payload for stages without a dedicated variant.
    Other { fields: Map<String, Value> },
    Empty,
}

impl StagePayload {
    /// The neutral result a stage reports when it has nothing to say.
    pub fn empty_for(stage: Stage) -> Self {
        match stage {
            Stage::YoloCoarse | Stage::YoloTiled | Stage::YoloFine | Stage::Sam2Refine => {
                StagePayload::Objects { objects: Vec::new() }
            }
            Stage::Faces => StagePayload::Faces { faces: Vec::new() },
            Stage::OcrFonts => StagePayload::Text { regions: Vec::new() },
            Stage::ColorComp => StagePayload::Color(ColorStats::default()),
            Stage::MotionSaliency => StagePayload::Motion(MotionStats::default()),
            Stage::Transitions => StagePayload::Transition(TransitionInfo::default()),
            Stage::AudioEng => StagePayload::Audio(AudioStats::default()),
            Stage::Superres => StagePayload::SuperRes {
                sr_used: false,
                scale: None,
            },
            Stage::Prep | Stage::QwenVl => StagePayload::Empty,
        }
    }

    pub fn objects(&self) -> Option<&[ObjectDetection]> {
        match self {
            StagePayload::Objects { objects } => Some(objects),
            _ => None,
        }
    }

    pub fn objects_mut(&mut self) -> Option<&mut Vec<ObjectDetection>> {
        match self {
            StagePayload::Objects { objects } => Some(objects),
            _ => None,
        }
    }
}

/// One stage's output with its provenance envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectorResult {
    pub payload: StagePayload,
    pub provenance: Provenance,
    /// Set when the stage failed and `payload` is a substituted empty result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectorResult {
    pub fn new(payload: StagePayload, provenance: Provenance) -> Self {
        Self {
            payload,
            provenance,
            error: None,
        }
    }

    /// Neutral result standing in for a failed stage.
    pub fn degraded(stage: Stage, provenance: Provenance, error: impl Into<String>) -> Self {
        Self {
            payload: StagePayload::empty_for(stage),
            provenance,
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Output of the vision-language reasoner.
///
/// Service failures are captured here (`error`, optionally with the raw
/// response) instead of failing the shot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReasoningOutput {
    #[serde(flatten)]
    pub content: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ReasoningOutput {
    pub fn from_content(content: Map<String, Value>) -> Self {
        Self {
            content,
            error: None,
            raw: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn summary(&self) -> Option<&str> {
        self.content.get("summary").and_then(Value::as_str)
    }

    pub fn mood(&self) -> Option<&str> {
        self.content.get("mood").and_then(Value::as_str)
    }
}
