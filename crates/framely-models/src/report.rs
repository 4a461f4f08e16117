//! The final analysis report.
//!
//! A report is produced once per run and never modified afterwards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::coverage::{CoverageReport, GateDecision, GateReason, GateState};
use crate::provenance::Provenance;
use crate::scene::Scene;
use crate::shot::Shot;

/// Report schema version.
pub const SCHEMA_VERSION: &str = "1.1.0";

/// Counters captured at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RunMetricsSnapshot {
    pub oom_trips: u64,
    pub retries: u64,
    pub stage_failures: u64,
    /// Cumulative wall time per operation, in milliseconds
    #[serde(default)]
    pub latency_ms: BTreeMap<String, u64>,
}

/// Source identity of the analyzed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoInfo {
    pub video_id: String,
    pub path: String,
    /// SHA-256 of the source file
    pub sha256: String,
    pub metrics: RunMetricsSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Detection totals merged across all shots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct DetectionSummary {
    pub total_objects: usize,
    pub total_faces: usize,
    pub total_text_regions: usize,
    pub object_counts: BTreeMap<String, usize>,
    pub unique_object_classes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalStats {
    pub total_frames: u64,
    pub duration_s: f64,
    pub fps: f64,
    pub resolution: Resolution,
    pub detections: DetectionSummary,
}

/// An object followed across frames of one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrackSummary {
    pub shot_id: String,
    pub track_id: u32,
    pub label: String,
    pub first_frame: u64,
    pub last_frame: u64,
    pub detections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskSeverity::Low => "low",
            RiskSeverity::Medium => "medium",
            RiskSeverity::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// A quality risk attached to one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Risk {
    pub shot_id: String,
    #[serde(rename = "type")]
    pub risk_type: String,
    pub severity: RiskSeverity,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metric: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Risk {
    pub fn new(
        shot_id: impl Into<String>,
        risk_type: impl Into<String>,
        severity: RiskSeverity,
    ) -> Self {
        Self {
            shot_id: shot_id.into(),
            risk_type: risk_type.into(),
            severity,
            metric: Map::new(),
            detail: None,
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metric.insert(name.into(), value.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Expected detector accuracy per detector family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Calibration {
    pub family: String,
    pub expected_tpr: f64,
    pub expected_fpr: f64,
}

impl Calibration {
    pub fn new(family: impl Into<String>, expected_tpr: f64, expected_fpr: f64) -> Self {
        Self {
            family: family.into(),
            expected_tpr,
            expected_fpr,
        }
    }

    /// Calibration table shipped with the current detector set.
    pub fn standard() -> Vec<Calibration> {
        vec![
            Calibration::new("objects", 0.94, 0.06),
            Calibration::new("ocr", 0.97, 0.03),
            Calibration::new("audio", 0.98, 0.02),
        ]
    }
}

/// Gate decision together with the coverage it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReportStatus {
    pub state: GateState,
    pub reasons: Vec<GateReason>,
    pub coverage: CoverageReport,
}

impl ReportStatus {
    pub fn new(decision: GateDecision, coverage: CoverageReport) -> Self {
        Self {
            state: decision.state,
            reasons: decision.reasons,
            coverage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub schema_version: String,
    pub video: VideoInfo,
    #[serde(rename = "global")]
    pub global_stats: GlobalStats,
    pub scenes: Vec<Scene>,
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub tracks: Vec<TrackSummary>,
    pub status: ReportStatus,
    pub risks: Vec<Risk>,
    pub provenance: Vec<Provenance>,
    pub calibration: Vec<Calibration>,
}

impl Report {
    pub fn shot(&self, shot_id: &str) -> Option<&Shot> {
        self.shots.iter().find(|s| s.shot_id == shot_id)
    }

    pub fn risks_of_type<'a>(&'a self, risk_type: &'a str) -> impl Iterator<Item = &'a Risk> + 'a {
        self.risks.iter().filter(move |r| r.risk_type == risk_type)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::schema_for;

    #[test]
    fn test_risk_serializes_type_field() {
        let risk = Risk::new("sh_001", "low_dialogue_intelligibility", RiskSeverity::High)
            .with_metric("stoi", 0.5);
        let value = serde_json::to_value(&risk).unwrap();
        assert_eq!(value["type"], "low_dialogue_intelligibility");
        assert_eq!(value["severity"], "high");
        assert_eq!(value["metric"]["stoi"], 0.5);
        assert!(value.get("detail").is_none());
    }

    #[test]
    fn test_standard_calibration() {
        let table = Calibration::standard();
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].family, "objects");
        assert_eq!(table[2].expected_fpr, 0.02);
    }

    #[test]
    fn test_report_schema_generation() {
        let schema = schema_for!(Report);
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json["properties"]["global"].is_object());
        assert!(json["properties"]["schema_version"].is_object());
    }
}
