//! Multi-frame object tracking within a shot.
//!
//! A greedy IoU tracker assigns stable `track_id`s to object detections.
//! Each (video, shot) pair gets its own [`TrackState`]; the coordinator
//! creates it and hands it to the pipeline's tracking step, which is its
//! only user.

use framely_models::config::TrackConfig;
use framely_models::{ObjectDetection, TrackSummary};

/// Scope of a tracker state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey {
    pub video_id: String,
    pub shot_id: String,
}

impl TrackKey {
    pub fn new(video_id: impl Into<String>, shot_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            shot_id: shot_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    id: u32,
    label: String,
    bbox: framely_models::BoundingBox,
    first_frame: u64,
    last_frame: u64,
    hits: u32,
}

/// Tracker state for one (video, shot).
#[derive(Debug, Clone)]
pub struct TrackState {
    key: TrackKey,
    config: TrackConfig,
    tracks: Vec<Track>,
    next_id: u32,
}

impl TrackState {
    pub fn new(key: TrackKey, config: TrackConfig) -> Self {
        Self {
            key,
            config,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    pub fn key(&self) -> &TrackKey {
        &self.key
    }

    /// Drop all tracks, e.g. before a shot is analyzed again.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 0;
    }

    /// Assign track ids to `objects` in place.
    ///
    /// Detections are visited in frame order. Each is matched to the live
    /// track of the same label with the highest IoU above the threshold; a
    /// track is live while it was last seen within `window` frames.
    /// Detections of tracks with fewer than `min_hits` matches end up without
    /// an id.
    pub fn assign(&mut self, objects: &mut [ObjectDetection]) {
        let mut order: Vec<usize> = (0..objects.len()).collect();
        order.sort_by_key(|&i| objects[i].frame);

        let mut assigned: Vec<Option<usize>> = vec![None; objects.len()];
        let mut frame_start = 0;
        while frame_start < order.len() {
            let frame = objects[order[frame_start]].frame;
            let frame_end = order[frame_start..]
                .iter()
                .position(|&i| objects[i].frame != frame)
                .map(|offset| frame_start + offset)
                .unwrap_or(order.len());

            // Tracks matched in this frame cannot take a second detection.
            let mut taken = vec![false; self.tracks.len()];
            for &i in &order[frame_start..frame_end] {
                let slot = self.match_track(&objects[i], frame, &taken);
                let slot = match slot {
                    Some(slot) => {
                        let track = &mut self.tracks[slot];
                        track.bbox = objects[i].bbox;
                        track.last_frame = frame;
                        track.hits += 1;
                        slot
                    }
                    None => {
                        self.tracks.push(Track {
                            id: self.next_id,
                            label: objects[i].label.clone(),
                            bbox: objects[i].bbox,
                            first_frame: frame,
                            last_frame: frame,
                            hits: 1,
                        });
                        self.next_id += 1;
                        taken.push(false);
                        self.tracks.len() - 1
                    }
                };
                taken[slot] = true;
                assigned[i] = Some(slot);
            }
            frame_start = frame_end;
        }

        for (object, slot) in objects.iter_mut().zip(assigned) {
            object.track_id = slot
                .map(|s| &self.tracks[s])
                .filter(|t| t.hits >= self.config.min_hits)
                .map(|t| t.id);
        }
    }

    fn match_track(&self, object: &ObjectDetection, frame: u64, taken: &[bool]) -> Option<usize> {
        let window = u64::from(self.config.window);
        self.tracks
            .iter()
            .enumerate()
            .filter(|(slot, track)| {
                !taken[*slot]
                    && track.label == object.label
                    && frame.saturating_sub(track.last_frame) <= window
            })
            .map(|(slot, track)| (slot, track.bbox.iou(&object.bbox)))
            .filter(|(_, iou)| *iou >= self.config.iou_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(slot, _)| slot)
    }

    /// Confirmed tracks, ordered by id.
    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.tracks
            .iter()
            .filter(|t| t.hits >= self.config.min_hits)
            .map(|t| TrackSummary {
                shot_id: self.key.shot_id.clone(),
                track_id: t.id,
                label: t.label.clone(),
                first_frame: t.first_frame,
                last_frame: t.last_frame,
                detections: t.hits as usize,
            })
            .collect()
    }
}
