//! JSON-strict prompts for shot and scene reasoning.

use framely_models::{Scene, Shot, Stage, StagePayload};

pub const SHOT_SYSTEM: &str = r#"You are a precise video analyst. Return STRICT JSON only with keys: summary, mood, intent, composition_notes, transition_guess.

Example response:
{
  "summary": "Close-up of person speaking directly to camera",
  "mood": "professional",
  "intent": "direct_address",
  "composition_notes": ["centered framing", "shallow depth of field", "neutral background"],
  "transition_guess": "cut"
}

Do not include any text outside the JSON object."#;

pub const SCENE_SYSTEM: &str = r#"You are a precise scene analyst. Return STRICT JSON only with keys: narrative_function, tone, motifs, risks.

Example response:
{
  "narrative_function": "introduction",
  "tone": "upbeat",
  "motifs": ["product showcase", "lifestyle imagery"],
  "risks": []
}

Do not include any text outside the JSON object."#;

const MAX_OBJECT_LABELS: usize = 10;
const MAX_TEXT_SNIPPETS: usize = 5;

fn list_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// User prompt describing one shot's detector outputs.
pub fn shot_prompt(shot: &Shot) -> String {
    let objects: Vec<&str> = shot
        .objects()
        .unwrap_or_default()
        .iter()
        .take(MAX_OBJECT_LABELS)
        .map(|o| o.label.as_str())
        .collect();

    let faces = match shot.result(Stage::Faces).map(|r| &r.payload) {
        Some(StagePayload::Faces { faces }) => faces.len(),
        _ => 0,
    };

    let text: Vec<&str> = match shot.result(Stage::OcrFonts).map(|r| &r.payload) {
        Some(StagePayload::Text { regions }) => regions
            .iter()
            .take(MAX_TEXT_SNIPPETS)
            .map(|r| r.text.as_str())
            .collect(),
        _ => Vec::new(),
    };

    let (brightness, saturation) = match shot.result(Stage::ColorComp).map(|r| &r.payload) {
        Some(StagePayload::Color(stats)) => (stats.brightness, stats.saturation),
        _ => (0.5, 0.5),
    };

    let motion_type = match shot.result(Stage::MotionSaliency).map(|r| &r.payload) {
        Some(StagePayload::Motion(stats)) => stats.motion_type.as_str(),
        _ => "static",
    };

    let faces = if faces > 0 {
        format!("{} face(s)", faces)
    } else {
        "none".to_string()
    };

    format!(
        "Analyze this video shot and return JSON.\n\n\
         Shot ID: {shot_id}\n\
         Duration: {duration:.2}s\n\
         Frame count: {frame_count}\n\n\
         Detected objects: {objects}\n\
         Detected faces: {faces}\n\
         Detected text: {text}\n\
         Color info: brightness={brightness:.2}, saturation={saturation:.2}\n\
         Motion: {motion_type}\n\n\
         Provide JSON analysis following the format specified in the system prompt.",
        shot_id = shot.shot_id,
        duration = shot.duration_s(),
        frame_count = shot.frame_count(),
        objects = list_or_none(&objects),
        faces = faces,
        text = list_or_none(&text),
        brightness = brightness,
        saturation = saturation,
        motion_type = motion_type,
    )
}

/// User prompt describing a scene through its member shots' summaries.
pub fn scene_prompt(scene: &Scene, shots: &[&Shot]) -> String {
    let summaries: Vec<String> = shots
        .iter()
        .map(|shot| {
            let summary = shot
                .reasoning
                .as_ref()
                .and_then(|r| r.summary())
                .unwrap_or("No summary available");
            format!("- {}: {}", shot.shot_id, summary)
        })
        .collect();

    let features = serde_json::to_string_pretty(&scene.features).unwrap_or_default();

    format!(
        "Analyze this scene and return JSON.\n\n\
         Scene ID: {scene_id}\n\
         Duration: {duration:.2}s\n\
         Number of shots: {shot_count}\n\n\
         Shot summaries:\n{summaries}\n\n\
         Features: {features}\n\n\
         Provide JSON analysis following the format specified in the system prompt.",
        scene_id = scene.scene_id,
        duration = scene.features.total_duration_s,
        shot_count = scene.features.shot_count,
        summaries = summaries.join("\n"),
        features = features,
    )
}
