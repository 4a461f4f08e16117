//! Analysis stage identifiers.
//!
//! A stage is one named unit of per-shot analysis. The dependency structure
//! between stages lives in the engine's stage graph; this module only names
//! them so that shot bundles can key their detector results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One named unit of per-shot analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Frame and shot preparation (performed before the per-shot pipeline).
    Prep,
    /// Full-frame object detection.
    YoloCoarse,
    /// Tiled object detection for small objects.
    YoloTiled,
    /// Super-resolution of small regions.
    Superres,
    /// Object detection on super-resolved regions.
    YoloFine,
    /// Segmentation-based refinement of object detections.
    Sam2Refine,
    /// Face detection.
    Faces,
    /// Text and font recognition.
    OcrFonts,
    /// Color and composition statistics.
    ColorComp,
    /// Motion and saliency analysis.
    MotionSaliency,
    /// Audio engineering metrics (loudness, speech, intelligibility).
    AudioEng,
    /// Transition classification at shot boundaries.
    Transitions,
    /// Vision-language reasoning over the accumulated outputs.
    QwenVl,
}

impl Stage {
    /// All stages in declaration order.
    pub const ALL: &'static [Stage] = &[
        Stage::Prep,
        Stage::YoloCoarse,
        Stage::YoloTiled,
        Stage::Superres,
        Stage::YoloFine,
        Stage::Sam2Refine,
        Stage::Faces,
        Stage::OcrFonts,
        Stage::ColorComp,
        Stage::MotionSaliency,
        Stage::AudioEng,
        Stage::Transitions,
        Stage::QwenVl,
    ];

    /// Returns the stage name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prep => "prep",
            Stage::YoloCoarse => "yolo_coarse",
            Stage::YoloTiled => "yolo_tiled",
            Stage::Superres => "superres",
            Stage::YoloFine => "yolo_fine",
            Stage::Sam2Refine => "sam2_refine",
            Stage::Faces => "faces",
            Stage::OcrFonts => "ocr_fonts",
            Stage::ColorComp => "color_comp",
            Stage::MotionSaliency => "motion_saliency",
            Stage::AudioEng => "audio_eng",
            Stage::Transitions => "transitions",
            Stage::QwenVl => "qwen_vl",
        }
    }

    /// Returns true if this stage produces an object detection list.
    pub fn produces_objects(&self) -> bool {
        matches!(
            self,
            Stage::YoloCoarse | Stage::YoloTiled | Stage::YoloFine | Stage::Sam2Refine
        )
    }

    /// Object-producing stages, most refined first.
    pub const OBJECT_PRECEDENCE: &'static [Stage] = &[
        Stage::Sam2Refine,
        Stage::YoloFine,
        Stage::YoloTiled,
        Stage::YoloCoarse,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s.to_lowercase())
            .ok_or_else(|| StageParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unknown stage: {0}")]
pub struct StageParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), *stage);
        }
        assert!("warp_drive".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_serde_names_match_as_str() {
        let json = serde_json::to_string(&Stage::Sam2Refine).unwrap();
        assert_eq!(json, "\"sam2_refine\"");
        let json = serde_json::to_string(&Stage::QwenVl).unwrap();
        assert_eq!(json, "\"qwen_vl\"");
    }

    #[test]
    fn test_object_stages() {
        assert!(Stage::YoloTiled.produces_objects());
        assert!(!Stage::Faces.produces_objects());
        assert!(Stage::OBJECT_PRECEDENCE.iter().all(|s| s.produces_objects()));
    }
}
