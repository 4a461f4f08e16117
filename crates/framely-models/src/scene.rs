//! Scenes: consecutive shots grouped by visual continuity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::ReasoningOutput;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneAudio {
    /// Mean integrated loudness over member shots
    pub avg_loudness: f64,
    pub has_speech: bool,
    pub has_music: bool,
}

/// Aggregated features of a scene's member shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneFeatures {
    pub avg_brightness: f64,
    pub dominant_mood: String,
    pub has_camera_motion: bool,
    pub shot_count: usize,
    pub total_duration_s: f64,
    pub audio: SceneAudio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub scene_id: String,
    /// Member shot ids in shot order
    pub shots: Vec<String>,
    pub start_frame: u64,
    pub end_frame: u64,
    pub features: SceneFeatures,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<ReasoningOutput>,
}

impl Scene {
    /// Canonical scene id for an index (`sc_000`, `sc_001`, ...).
    pub fn id_for(index: usize) -> String {
        format!("sc_{:03}", index)
    }

    pub fn contains(&self, shot_id: &str) -> bool {
        self.shots.iter().any(|id| id == shot_id)
    }
}
