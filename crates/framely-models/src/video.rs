//! Video metadata produced by preparation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What preparation learned about the source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    pub video_id: String,
    /// Path to the source file
    pub path: String,
    /// Total number of frames in the video
    pub frames: u64,
    pub fps: f64,
    pub duration_s: f64,
    pub width: u32,
    pub height: u32,
    /// Extracted audio track; `None` when the video has no audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
}

impl VideoMetadata {
    pub fn new(video_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            path: path.into(),
            frames: 0,
            fps: 30.0,
            duration_s: 0.0,
            width: 0,
            height: 0,
            audio_path: None,
        }
    }

    /// Set frame count and rate; duration follows from them.
    pub fn with_timing(mut self, frames: u64, fps: f64) -> Self {
        self.frames = frames;
        self.fps = fps;
        self.duration_s = if fps > 0.0 { frames as f64 / fps } else { 0.0 };
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_audio(mut self, audio_path: impl Into<String>) -> Self {
        self.audio_path = Some(audio_path.into());
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio_path.is_some()
    }
}
