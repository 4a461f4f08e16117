//! Analysis configuration.
//!
//! The configuration is a plain value. Ablations and fallback degradations
//! never mutate a shared instance; they derive a new one
//! ([`AnalysisConfig::with_ablations`], [`AnalysisConfig::degraded`]).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};
use crate::shot::DegradationFlag;
use crate::stage::Stage;

/// Minimum reasoning context after shrinking.
pub const MIN_REASONING_CONTEXT: usize = 6;

/// One degradation action of the fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStep {
    Sam2Off,
    SrOff,
    QwenCtxShrink,
}

impl FallbackStep {
    pub fn as_str(&self) -> &'static str {
        self.flag().as_str()
    }

    /// Flag recorded on the shot when this step is applied.
    pub fn flag(&self) -> DegradationFlag {
        match self {
            FallbackStep::Sam2Off => DegradationFlag::Sam2Off,
            FallbackStep::SrOff => DegradationFlag::SrOff,
            FallbackStep::QwenCtxShrink => DegradationFlag::QwenCtxShrink,
        }
    }

    /// Apply this step to a configuration value.
    pub fn apply(&self, config: &mut AnalysisConfig) {
        match self {
            FallbackStep::Sam2Off => config.detect.sam2.enabled = false,
            FallbackStep::SrOff => config.detect.superres.enabled = false,
            FallbackStep::QwenCtxShrink => {
                let current = config.runtime.qwen_context_max_frames;
                config.runtime.qwen_context_max_frames = (current / 2).max(MIN_REASONING_CONTEXT);
            }
        }
    }
}

impl fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FallbackStep {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sam2_off" => Ok(FallbackStep::Sam2Off),
            "sr_off" => Ok(FallbackStep::SrOff),
            "qwen_ctx_shrink" => Ok(FallbackStep::QwenCtxShrink),
            other => Err(ModelError::invalid_config(format!(
                "unknown fallback step: {}",
                other
            ))),
        }
    }
}

/// What the coordinator does when a shot fails after its retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShotFailurePolicy {
    /// Abort the run; no report is produced
    #[default]
    FailRun,
    /// Keep going and report the failed shot as a risk
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Analyze every n-th frame
    pub frame_stride: u32,
    /// Maximum concurrent holders of the accelerator pool
    pub gpu_semaphore: usize,
    pub oom_fallback_order: Vec<FallbackStep>,
    pub qwen_context_max_frames: usize,
    pub shot_failure_policy: ShotFailurePolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_stride: 1,
            gpu_semaphore: 2,
            oom_fallback_order: vec![
                FallbackStep::Sam2Off,
                FallbackStep::SrOff,
                FallbackStep::QwenCtxShrink,
            ],
            qwen_context_max_frames: 12,
            shot_failure_policy: ShotFailurePolicy::FailRun,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TwoPassConfig {
    pub enabled: bool,
}

impl Default for TwoPassConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TileConfig {
    pub size: u32,
    pub stride: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            size: 640,
            stride: 512,
        }
    }
}

impl TileConfig {
    /// Overlapping tiles leave no uncovered pixels.
    pub fn full_coverage(&self) -> bool {
        self.stride < self.size
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SuperresConfig {
    pub enabled: bool,
    /// Objects shorter than this (px) trigger super-resolution
    pub trigger_min_h: u32,
}

impl Default for SuperresConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_min_h: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Sam2Config {
    pub enabled: bool,
}

impl Default for Sam2Config {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TrackConfig {
    /// Frames a track survives without a match
    pub window: u32,
    /// Matches required before a track id is reported
    pub min_hits: u32,
    pub iou_threshold: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            window: 30,
            min_hits: 3,
            iou_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DetectConfig {
    pub two_pass: TwoPassConfig,
    pub tile: TileConfig,
    pub superres: SuperresConfig,
    pub sam2: Sam2Config,
    pub small_object_min_px: u32,
    pub track: TrackConfig,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            two_pass: TwoPassConfig::default(),
            tile: TileConfig::default(),
            superres: SuperresConfig::default(),
            sam2: Sam2Config::default(),
            small_object_min_px: 8,
            track: TrackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LoudnessConfig {
    pub target_lufs: f64,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self { target_lufs: -14.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StoiConfig {
    pub enabled: bool,
    /// Per-shot intelligibility below this is reported as a risk
    pub min_ok: f64,
}

impl Default for StoiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_ok: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AudioConfig {
    pub loudness: LoudnessConfig,
    pub stoi: StoiConfig,
}

/// Minimum acceptable coverage; `min_detectable_px` is a maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CoverageThresholds {
    pub frames_analyzed_pct: f64,
    pub min_detectable_px: f64,
    pub lufs_trace_pct: f64,
    pub stoi_pct: f64,
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        Self {
            frames_analyzed_pct: 99.0,
            min_detectable_px: 12.0,
            lufs_trace_pct: 95.0,
            stoi_pct: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AblationFlags {
    /// Disable super-resolution
    pub no_sr: bool,
    /// Disable the tiled detection pass
    pub no_tiling: bool,
    /// Skip intelligibility measurement
    pub light_audio: bool,
}

impl AblationFlags {
    pub fn any(&self) -> bool {
        self.no_sr || self.no_tiling || self.light_audio
    }

    /// Flags set in either value. An override can switch a stage off but
    /// never re-enables one the base configuration disabled.
    pub fn union(&self, other: &AblationFlags) -> AblationFlags {
        AblationFlags {
            no_sr: self.no_sr || other.no_sr,
            no_tiling: self.no_tiling || other.no_tiling,
            light_audio: self.light_audio || other.light_audio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SceneConfig {
    /// Brightness jump (0-1 scale) that starts a new scene
    pub brightness_threshold: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 0.3,
        }
    }
}

/// Complete analysis configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    pub runtime: RuntimeConfig,
    pub detect: DetectConfig,
    pub audio: AudioConfig,
    pub coverage_thresholds: CoverageThresholds,
    pub ablation: AblationFlags,
    pub scenes: SceneConfig,
}

impl AnalysisConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ModelResult<()> {
        if self.runtime.gpu_semaphore == 0 {
            return Err(ModelError::invalid_config(
                "runtime.gpu_semaphore must be at least 1",
            ));
        }
        if self.runtime.frame_stride == 0 {
            return Err(ModelError::invalid_config(
                "runtime.frame_stride must be at least 1",
            ));
        }
        if self.detect.tile.size == 0 || self.detect.tile.stride == 0 {
            return Err(ModelError::invalid_config(
                "detect.tile.size and detect.tile.stride must be positive",
            ));
        }
        if !self.detect.tile.full_coverage() {
            return Err(ModelError::invalid_config(format!(
                "detect.tile.stride ({}) must be smaller than detect.tile.size ({}) so tiles overlap",
                self.detect.tile.stride, self.detect.tile.size
            )));
        }
        if !(0.0..=1.0).contains(&self.scenes.brightness_threshold) {
            return Err(ModelError::invalid_config(
                "scenes.brightness_threshold must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.audio.stoi.min_ok) {
            return Err(ModelError::invalid_config(
                "audio.stoi.min_ok must be within [0, 1]",
            ));
        }
        for (i, step) in self.runtime.oom_fallback_order.iter().enumerate() {
            if self.runtime.oom_fallback_order[..i].contains(step) {
                return Err(ModelError::invalid_config(format!(
                    "runtime.oom_fallback_order lists {} twice",
                    step
                )));
            }
        }
        Ok(())
    }

    /// Effective configuration with the ablation flags folded in.
    pub fn with_ablations(&self) -> Self {
        let mut config = self.clone();
        if config.ablation.no_sr {
            config.detect.superres.enabled = false;
        }
        if config.ablation.no_tiling {
            config.detect.two_pass.enabled = false;
        }
        if config.ablation.light_audio {
            config.audio.stoi.enabled = false;
        }
        config
    }

    /// Configuration for a retry attempt with the given steps applied.
    pub fn degraded(&self, steps: &[FallbackStep]) -> Self {
        let mut config = self.clone();
        for step in steps {
            step.apply(&mut config);
        }
        config
    }

    /// Effective parameters of a stage, used for provenance hashing.
    pub fn stage_params(&self, stage: Stage) -> Value {
        match stage {
            Stage::Prep => json!({ "frame_stride": self.runtime.frame_stride }),
            Stage::YoloCoarse => json!({ "frame_stride": self.runtime.frame_stride }),
            Stage::YoloTiled => json!({
                "tile_size": self.detect.tile.size,
                "stride": self.detect.tile.stride,
            }),
            Stage::Superres => json!({
                "enabled": self.detect.superres.enabled,
                "trigger_min_h": self.detect.superres.trigger_min_h,
            }),
            Stage::YoloFine => json!({
                "small_object_min_px": self.detect.small_object_min_px,
            }),
            Stage::Sam2Refine => json!({ "enabled": self.detect.sam2.enabled }),
            Stage::Faces | Stage::OcrFonts | Stage::ColorComp | Stage::Transitions => {
                json!({ "frame_stride": self.runtime.frame_stride })
            }
            Stage::MotionSaliency => json!({
                "frame_stride": self.runtime.frame_stride,
                "track_window": self.detect.track.window,
                "track_min_hits": self.detect.track.min_hits,
            }),
            Stage::AudioEng => json!({
                "target_lufs": self.audio.loudness.target_lufs,
                "stoi_enabled": self.audio.stoi.enabled,
            }),
            Stage::QwenVl => json!({
                "context_max_frames": self.runtime.qwen_context_max_frames,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.runtime.gpu_semaphore, 2);
        assert_eq!(config.runtime.oom_fallback_order.len(), 3);
        assert!(config.detect.tile.full_coverage());
        assert_eq!(config.coverage_thresholds.stoi_pct, 90.0);
        assert_eq!(config.runtime.shot_failure_policy, ShotFailurePolicy::FailRun);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_like_input_keeps_defaults() {
        let config: AnalysisConfig = serde_json::from_value(json!({
            "runtime": { "gpu_semaphore": 4 },
            "ablation": { "no_sr": true }
        }))
        .unwrap();
        assert_eq!(config.runtime.gpu_semaphore, 4);
        assert_eq!(config.runtime.qwen_context_max_frames, 12);
        assert!(config.ablation.no_sr);
        assert_eq!(config.detect.tile.size, 640);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AnalysisConfig::default();
        config.runtime.gpu_semaphore = 0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.detect.tile.stride = 700;
        assert!(config.validate().is_err());

        // Equal stride leaves tiles edge to edge with no overlap.
        let mut config = AnalysisConfig::default();
        config.detect.tile.stride = config.detect.tile.size;
        assert!(config.validate().is_err());
        config.detect.tile.stride = config.detect.tile.size - 1;
        assert!(config.validate().is_ok());

        let mut config = AnalysisConfig::default();
        config.runtime.oom_fallback_order = vec![FallbackStep::SrOff, FallbackStep::SrOff];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ablation_union_keeps_both_sides() {
        let base = AblationFlags {
            no_tiling: true,
            ..Default::default()
        };
        let request = AblationFlags {
            no_sr: true,
            ..Default::default()
        };
        let merged = base.union(&request);
        assert!(merged.no_tiling);
        assert!(merged.no_sr);
        assert!(!merged.light_audio);
        assert_eq!(AblationFlags::default().union(&base), base);
    }

    #[test]
    fn test_ablations_derive_new_config() {
        let mut base = AnalysisConfig::default();
        base.ablation = AblationFlags {
            no_sr: true,
            no_tiling: true,
            light_audio: true,
        };
        let effective = base.with_ablations();
        assert!(!effective.detect.superres.enabled);
        assert!(!effective.detect.two_pass.enabled);
        assert!(!effective.audio.stoi.enabled);
        // The source value is untouched.
        assert!(base.detect.superres.enabled);
    }

    #[test]
    fn test_degraded_applies_steps() {
        let base = AnalysisConfig::default();
        let degraded = base.degraded(&[
            FallbackStep::Sam2Off,
            FallbackStep::SrOff,
            FallbackStep::QwenCtxShrink,
        ]);
        assert!(!degraded.detect.sam2.enabled);
        assert!(!degraded.detect.superres.enabled);
        assert_eq!(degraded.runtime.qwen_context_max_frames, 6);
        assert!(base.detect.sam2.enabled);
        assert_eq!(base.runtime.qwen_context_max_frames, 12);
    }

    #[test]
    fn test_context_shrink_has_floor() {
        let mut config = AnalysisConfig::default();
        config.runtime.qwen_context_max_frames = 8;
        FallbackStep::QwenCtxShrink.apply(&mut config);
        assert_eq!(config.runtime.qwen_context_max_frames, MIN_REASONING_CONTEXT);
    }

    #[test]
    fn test_fallback_step_parse() {
        assert_eq!("sr_off".parse::<FallbackStep>().unwrap(), FallbackStep::SrOff);
        assert!("gpu_off".parse::<FallbackStep>().is_err());
        assert_eq!(FallbackStep::QwenCtxShrink.flag(), DegradationFlag::QwenCtxShrink);
    }

    #[test]
    fn test_stage_params_track_config() {
        let base = AnalysisConfig::default();
        let degraded = base.degraded(&[FallbackStep::Sam2Off]);
        assert_ne!(
            base.stage_params(Stage::Sam2Refine),
            degraded.stage_params(Stage::Sam2Refine)
        );
        assert_eq!(
            base.stage_params(Stage::Faces),
            degraded.stage_params(Stage::Faces)
        );
    }
}
