//! Coverage metrics and the quality gate.

use framely_models::config::CoverageThresholds;
use framely_models::{
    AnalysisConfig, AudioCoverage, CoverageReport, GateDecision, GateReason, GateState,
    SpatialCoverage, Shot, Stage, StagePayload, TemporalCoverage, VideoMetadata,
};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        round2(100.0 * part / whole)
    }
}

/// Compute coverage metrics for the analyzed shots.
///
/// Temporal coverage is capped at 100 and is zero when the frame count is
/// unknown. Audio percentages are duration-weighted over the analyzed shots
/// and are zero when the video has no audio track.
pub fn compute_coverage(
    video: &VideoMetadata,
    shots: &[Shot],
    config: &AnalysisConfig,
) -> CoverageReport {
    let analyzed: u64 = shots.iter().map(|s| s.frame_count()).sum();
    let frames_analyzed_pct = pct(analyzed as f64, video.frames as f64).min(100.0);

    let tile = &config.detect.tile;
    let pixels_covered_pct = if tile.stride == 0 {
        0.0
    } else {
        let ratio = f64::from(tile.size) / f64::from(tile.stride);
        round2((ratio * ratio * 100.0).min(100.0))
    };

    let sr_used = shots.iter().any(|s| {
        matches!(
            s.result(Stage::Superres).map(|r| &r.payload),
            Some(StagePayload::SuperRes { sr_used: true, .. })
        )
    });

    let audio = if video.has_audio() {
        let total: f64 = shots.iter().map(|s| s.duration_s()).sum();
        let measured = |has: fn(&Shot) -> bool| -> f64 {
            shots.iter().filter(|s| has(s)).map(|s| s.duration_s()).sum()
        };
        AudioCoverage {
            lufs_trace_pct: pct(measured(has_lufs), total),
            stoi_pct: pct(measured(has_stoi), total),
        }
    } else {
        AudioCoverage {
            lufs_trace_pct: 0.0,
            stoi_pct: 0.0,
        }
    };

    CoverageReport {
        spatial: SpatialCoverage {
            tile_size: tile.size,
            stride: tile.stride,
            sr_used,
            pixels_covered_pct,
            min_detectable_px: f64::from(config.detect.small_object_min_px),
        },
        temporal: TemporalCoverage {
            frame_stride: config.runtime.frame_stride,
            frames_analyzed_pct,
        },
        audio,
    }
}

fn has_lufs(shot: &Shot) -> bool {
    audio_ok(shot) && shot.audio().is_some_and(|a| a.lufs.is_some())
}

fn has_stoi(shot: &Shot) -> bool {
    audio_ok(shot) && shot.audio().is_some_and(|a| a.dialogue.is_some())
}

fn audio_ok(shot: &Shot) -> bool {
    shot.result(Stage::AudioEng).is_some_and(|r| !r.is_degraded())
}

/// Compare coverage against thresholds.
///
/// Every threshold is checked; each violation adds its reason and moves the
/// state to at least `degraded`. Coverage alone never fails a run.
pub fn evaluate_gate(coverage: &CoverageReport, thresholds: &CoverageThresholds) -> GateDecision {
    let mut decision = GateDecision::ok();

    if coverage.temporal.frames_analyzed_pct < thresholds.frames_analyzed_pct {
        decision.escalate(GateState::Degraded, GateReason::LowTemporalCoverage);
    }
    if coverage.spatial.min_detectable_px > thresholds.min_detectable_px {
        decision.escalate(GateState::Degraded, GateReason::MinDetectablePxTooLarge);
    }
    if coverage.audio.lufs_trace_pct < thresholds.lufs_trace_pct {
        decision.escalate(GateState::Degraded, GateReason::LufsTraceMissing);
    }
    if coverage.audio.stoi_pct < thresholds.stoi_pct {
        decision.escalate(GateState::Degraded, GateReason::LowStoiCoverage);
    }

    decision
}

/// Per-shot warnings for analysis that should have happened but did not.
pub fn shot_warnings(shot: &Shot, video: &VideoMetadata) -> Vec<String> {
    let mut warnings = Vec::new();
    if shot.objects().is_none() {
        warnings.push("missing_object_detection".to_string());
    }
    if video.has_audio() && !audio_ok(shot) {
        warnings.push("missing_audio_analysis".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use framely_models::{
        AudioStats, DetectorResult, DialogueStats, ObjectDetection, Provenance,
    };
    use serde_json::json;

    fn coverage(frames: f64, min_px: f64, lufs: f64, stoi: f64) -> CoverageReport {
        CoverageReport {
            spatial: SpatialCoverage {
                tile_size: 640,
                stride: 512,
                sr_used: false,
                pixels_covered_pct: 100.0,
                min_detectable_px: min_px,
            },
            temporal: TemporalCoverage {
                frame_stride: 1,
                frames_analyzed_pct: frames,
            },
            audio: AudioCoverage {
                lufs_trace_pct: lufs,
                stoi_pct: stoi,
            },
        }
    }

    fn prov() -> Provenance {
        Provenance::new("test", "1", &json!({}))
    }

    fn audio_shot(index: usize, frames: u64, stoi: Option<f64>) -> Shot {
        let start = index as u64 * frames;
        let mut shot = Shot::new(index, start, start + frames, 24.0).unwrap();
        shot.detectors.insert(
            Stage::AudioEng,
            DetectorResult::new(
                StagePayload::Audio(AudioStats {
                    lufs: Some(-16.0),
                    dialogue: stoi.map(|stoi| DialogueStats {
                        stoi,
                        intelligibility: "good".into(),
                    }),
                    ..Default::default()
                }),
                prov(),
            ),
        );
        shot
    }

    #[test]
    fn test_gate_ok_when_all_thresholds_met() {
        let thresholds = CoverageThresholds::default();
        let decision = evaluate_gate(&coverage(100.0, 8.0, 100.0, 95.0), &thresholds);
        assert_eq!(decision.state, GateState::Ok);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn test_gate_low_stoi_only() {
        let thresholds = CoverageThresholds::default();
        let decision = evaluate_gate(&coverage(100.0, 8.0, 100.0, 50.0), &thresholds);
        assert_eq!(decision.state, GateState::Degraded);
        assert_eq!(decision.reasons, vec![GateReason::LowStoiCoverage]);
    }

    #[test]
    fn test_gate_accumulates_every_violation() {
        let thresholds = CoverageThresholds::default();
        let decision = evaluate_gate(&coverage(50.0, 20.0, 10.0, 10.0), &thresholds);
        assert_eq!(decision.state, GateState::Degraded);
        assert_eq!(
            decision.reasons,
            vec![
                GateReason::LowTemporalCoverage,
                GateReason::MinDetectablePxTooLarge,
                GateReason::LufsTraceMissing,
                GateReason::LowStoiCoverage,
            ]
        );
    }

    #[test]
    fn test_gate_is_idempotent() {
        let thresholds = CoverageThresholds::default();
        let input = coverage(90.0, 8.0, 100.0, 50.0);
        let first = evaluate_gate(&input, &thresholds);
        let second = evaluate_gate(&input, &thresholds);
        assert_eq!(first, second);
        assert_eq!(input, coverage(90.0, 8.0, 100.0, 50.0));
    }

    #[test]
    fn test_compute_coverage() {
        let video = VideoMetadata::new("v1", "/v1.mp4")
            .with_timing(96, 24.0)
            .with_audio("/v1.wav");
        let shots = vec![audio_shot(0, 24, Some(0.9)), audio_shot(1, 24, None)];
        let report = compute_coverage(&video, &shots, &AnalysisConfig::default());

        assert_eq!(report.temporal.frames_analyzed_pct, 50.0);
        assert_eq!(report.spatial.pixels_covered_pct, 100.0);
        assert_eq!(report.spatial.min_detectable_px, 8.0);
        assert!(!report.spatial.sr_used);
        assert_eq!(report.audio.lufs_trace_pct, 100.0);
        assert_eq!(report.audio.stoi_pct, 50.0);
    }

    #[test]
    fn test_unknown_frame_count_fails_temporal_threshold() {
        let video = VideoMetadata::new("v1", "/v1.mp4");
        let shots = vec![Shot::new(0, 0, 24, 24.0).unwrap()];
        let report = compute_coverage(&video, &shots, &AnalysisConfig::default());
        assert_eq!(report.temporal.frames_analyzed_pct, 0.0);

        let decision = evaluate_gate(&report, &CoverageThresholds::default());
        assert!(decision.reasons.contains(&GateReason::LowTemporalCoverage));
        assert_ne!(decision.state, GateState::Ok);
    }

    #[test]
    fn test_temporal_coverage_is_capped() {
        let video = VideoMetadata::new("v1", "/v1.mp4").with_timing(24, 24.0);
        let shots = vec![
            Shot::new(0, 0, 24, 24.0).unwrap(),
            Shot::new(1, 0, 24, 24.0).unwrap(),
        ];
        let report = compute_coverage(&video, &shots, &AnalysisConfig::default());
        assert_eq!(report.temporal.frames_analyzed_pct, 100.0);
    }

    #[test]
    fn test_no_audio_track_means_no_audio_coverage() {
        let video = VideoMetadata::new("v1", "/v1.mp4").with_timing(24, 24.0);
        let shots = vec![Shot::new(0, 0, 24, 24.0).unwrap()];
        let report = compute_coverage(&video, &shots, &AnalysisConfig::default());
        assert_eq!(report.temporal.frames_analyzed_pct, 100.0);
        assert_eq!(report.audio.lufs_trace_pct, 0.0);
        assert_eq!(report.audio.stoi_pct, 0.0);
    }

    #[test]
    fn test_shot_warnings() {
        let with_audio = VideoMetadata::new("v1", "/v1.mp4").with_audio("/v1.wav");
        let bare = Shot::new(0, 0, 24, 24.0).unwrap();
        assert_eq!(
            shot_warnings(&bare, &with_audio),
            vec!["missing_object_detection", "missing_audio_analysis"]
        );

        let mut complete = audio_shot(0, 24, None);
        complete.detectors.insert(
            Stage::YoloCoarse,
            DetectorResult::new(
                StagePayload::Objects {
                    objects: vec![ObjectDetection::new("cup", 0.7, Default::default(), 0)],
                },
                prov(),
            ),
        );
        assert!(shot_warnings(&complete, &with_audio).is_empty());

        let silent = VideoMetadata::new("v1", "/v1.mp4");
        assert_eq!(shot_warnings(&bare, &silent), vec!["missing_object_detection"]);
    }
}
