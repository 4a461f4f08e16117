//! Risk derivation.
//!
//! Risks are read off finished shots. They never change analysis results.

use framely_models::{AnalysisConfig, DegradationFlag, Risk, RiskSeverity, Shot};

pub const LOW_DIALOGUE_INTELLIGIBILITY: &str = "low_dialogue_intelligibility";
pub const SAM2_DISABLED: &str = "sam2_disabled";
pub const SUPERRES_DISABLED: &str = "superres_disabled";
pub const REASONING_CONTEXT_REDUCED: &str = "reasoning_context_reduced";
pub const SHOT_ANALYSIS_FAILED: &str = "shot_analysis_failed";

/// A shot that produced no analysis because it failed after its retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotFailure {
    pub shot_id: String,
    pub error: String,
}

/// Derive risks in shot order, followed by failed shots.
pub fn detect_risks(shots: &[Shot], config: &AnalysisConfig, failures: &[ShotFailure]) -> Vec<Risk> {
    let mut risks = Vec::new();

    for shot in shots {
        if let Some(dialogue) = shot.audio().and_then(|a| a.dialogue.as_ref()) {
            if dialogue.stoi < config.audio.stoi.min_ok {
                risks.push(
                    Risk::new(&shot.shot_id, LOW_DIALOGUE_INTELLIGIBILITY, RiskSeverity::High)
                        .with_metric("stoi", dialogue.stoi),
                );
            }
        }

        for flag in &shot.flags {
            let (risk_type, severity) = match flag {
                DegradationFlag::Sam2Off => (SAM2_DISABLED, RiskSeverity::Medium),
                DegradationFlag::SrOff => (SUPERRES_DISABLED, RiskSeverity::Medium),
                DegradationFlag::QwenCtxShrink => (REASONING_CONTEXT_REDUCED, RiskSeverity::Low),
            };
            risks.push(Risk::new(&shot.shot_id, risk_type, severity).with_detail(format!(
                "{} applied after accelerator exhaustion",
                flag
            )));
        }
    }

    for failure in failures {
        risks.push(
            Risk::new(&failure.shot_id, SHOT_ANALYSIS_FAILED, RiskSeverity::High)
                .with_detail(&failure.error),
        );
    }

    risks
}

#[cfg(test)]
mod tests {
    use super::*;
    use framely_models::{
        AudioStats, DetectorResult, DialogueStats, Provenance, Stage, StagePayload,
    };
    use serde_json::json;

    fn shot_with_stoi(index: usize, stoi: f64) -> Shot {
        let mut shot = Shot::new(index, 0, 24, 24.0).unwrap();
        shot.detectors.insert(
            Stage::AudioEng,
            DetectorResult::new(
                StagePayload::Audio(AudioStats {
                    dialogue: Some(DialogueStats {
                        stoi,
                        intelligibility: "poor".into(),
                    }),
                    ..Default::default()
                }),
                Provenance::new("audio", "1", &json!({})),
            ),
        );
        shot
    }

    #[test]
    fn test_low_stoi_is_high_severity() {
        let config = AnalysisConfig::default();
        let risks = detect_risks(
            &[shot_with_stoi(0, 0.5), shot_with_stoi(1, 0.9)],
            &config,
            &[],
        );
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].shot_id, "sh_000");
        assert_eq!(risks[0].risk_type, LOW_DIALOGUE_INTELLIGIBILITY);
        assert_eq!(risks[0].severity, RiskSeverity::High);
        assert_eq!(risks[0].metric["stoi"], json!(0.5));
    }

    #[test]
    fn test_degradation_flags_become_risks() {
        let mut shot = Shot::new(0, 0, 24, 24.0).unwrap();
        shot.add_flag(DegradationFlag::Sam2Off);
        shot.add_flag(DegradationFlag::QwenCtxShrink);
        let risks = detect_risks(&[shot], &AnalysisConfig::default(), &[]);

        let types: Vec<_> = risks.iter().map(|r| r.risk_type.as_str()).collect();
        assert_eq!(types, vec![SAM2_DISABLED, REASONING_CONTEXT_REDUCED]);
        assert_eq!(risks[0].severity, RiskSeverity::Medium);
        assert_eq!(risks[1].severity, RiskSeverity::Low);
    }

    #[test]
    fn test_failed_shots_are_listed_last() {
        let failures = vec![ShotFailure {
            shot_id: "sh_002".into(),
            error: "accelerator exhausted".into(),
        }];
        let risks = detect_risks(&[shot_with_stoi(0, 0.2)], &AnalysisConfig::default(), &failures);
        assert_eq!(risks.len(), 2);
        assert_eq!(risks[1].risk_type, SHOT_ANALYSIS_FAILED);
        assert_eq!(risks[1].detail.as_deref(), Some("accelerator exhausted"));
    }
}
