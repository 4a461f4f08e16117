//! Video-level statistics merged from shot results.

use std::collections::BTreeMap;

use framely_models::{
    DetectionSummary, GlobalStats, Resolution, Shot, Stage, StagePayload, TrackSummary,
    VideoMetadata,
};

pub fn global_stats(video: &VideoMetadata, shots: &[Shot]) -> GlobalStats {
    let mut detections = DetectionSummary::default();

    for shot in shots {
        if let Some(objects) = shot.objects() {
            detections.total_objects += objects.len();
            for object in objects {
                *detections
                    .object_counts
                    .entry(object.label.clone())
                    .or_insert(0) += 1;
            }
        }
        if let Some(StagePayload::Faces { faces }) = shot.result(Stage::Faces).map(|r| &r.payload) {
            detections.total_faces += faces.len();
        }
        if let Some(StagePayload::Text { regions }) =
            shot.result(Stage::OcrFonts).map(|r| &r.payload)
        {
            detections.total_text_regions += regions.len();
        }
    }
    detections.unique_object_classes = detections.object_counts.len();

    GlobalStats {
        total_frames: video.frames,
        duration_s: video.duration_s,
        fps: video.fps,
        resolution: Resolution {
            width: video.width,
            height: video.height,
        },
        detections,
    }
}

/// Confirmed tracks of every shot, read back from the objects' track ids.
pub fn track_summaries(shots: &[Shot]) -> Vec<TrackSummary> {
    let mut summaries = Vec::new();

    for shot in shots {
        let mut by_track: BTreeMap<u32, TrackSummary> = BTreeMap::new();
        for object in shot.objects().unwrap_or_default() {
            let Some(track_id) = object.track_id else {
                continue;
            };
            let summary = by_track.entry(track_id).or_insert_with(|| TrackSummary {
                shot_id: shot.shot_id.clone(),
                track_id,
                label: object.label.clone(),
                first_frame: object.frame,
                last_frame: object.frame,
                detections: 0,
            });
            summary.first_frame = summary.first_frame.min(object.frame);
            summary.last_frame = summary.last_frame.max(object.frame);
            summary.detections += 1;
        }
        summaries.extend(by_track.into_values());
    }

    summaries
}
