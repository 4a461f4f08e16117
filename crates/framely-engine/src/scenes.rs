//! Scene assembly.
//!
//! Shots are grouped greedily in shot order: a new scene starts whenever the
//! mean brightness jumps by more than the threshold between consecutive
//! shots. Features are aggregated from the member shots' analysis results;
//! frames are never read again.

use framely_models::{Scene, SceneAudio, SceneFeatures, Shot};

/// Loudness assumed for shots without an audio measurement.
pub const DEFAULT_LOUDNESS_LUFS: f64 = -14.0;

/// Group consecutive shots into scenes.
///
/// `shots` must be in shot order.
pub fn assemble(shots: &[Shot], brightness_threshold: f64) -> Vec<Scene> {
    let mut scenes = Vec::new();
    let Some(first) = shots.first() else {
        return scenes;
    };

    let mut current: Vec<&Shot> = vec![first];
    for pair in shots.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if (prev.brightness() - curr.brightness()).abs() > brightness_threshold {
            scenes.push(build_scene(scenes.len(), &current));
            current = vec![curr];
        } else {
            current.push(curr);
        }
    }
    scenes.push(build_scene(scenes.len(), &current));

    scenes
}

fn build_scene(index: usize, members: &[&Shot]) -> Scene {
    Scene {
        scene_id: Scene::id_for(index),
        shots: members.iter().map(|s| s.shot_id.clone()).collect(),
        start_frame: members.iter().map(|s| s.start_frame).min().unwrap_or(0),
        end_frame: members.iter().map(|s| s.end_frame).max().unwrap_or(0),
        features: scene_features(members),
        narrative: None,
    }
}

/// Aggregate features over a scene's member shots.
pub fn scene_features(members: &[&Shot]) -> SceneFeatures {
    let count = members.len();
    let mean = |values: Vec<f64>, default: f64| {
        if values.is_empty() {
            default
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };

    let avg_brightness = mean(members.iter().map(|s| s.brightness()).collect(), 0.5);
    let avg_loudness = mean(
        members
            .iter()
            .map(|s| s.audio().and_then(|a| a.lufs).unwrap_or(DEFAULT_LOUDNESS_LUFS))
            .collect(),
        DEFAULT_LOUDNESS_LUFS,
    );

    SceneFeatures {
        avg_brightness: (avg_brightness * 1000.0).round() / 1000.0,
        dominant_mood: dominant_mood(members),
        has_camera_motion: members.iter().any(|s| s.camera_motion()),
        shot_count: count,
        total_duration_s: members.iter().map(|s| s.duration_s()).sum(),
        audio: SceneAudio {
            avg_loudness,
            has_speech: members.iter().any(|s| s.audio().is_some_and(|a| a.has_speech)),
            has_music: members.iter().any(|s| s.audio().is_some_and(|a| a.has_music)),
        },
    }
}

/// Most frequent mood; ties go to the mood seen first.
fn dominant_mood(members: &[&Shot]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for shot in members {
        let mood = shot.mood();
        match counts.iter_mut().find(|(m, _)| *m == mood) {
            Some((_, n)) => *n += 1,
            None => counts.push((mood, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (mood, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((mood, n));
        }
    }
    best.map(|(mood, _)| mood.to_string())
        .unwrap_or_else(|| "neutral".to_string())
}
