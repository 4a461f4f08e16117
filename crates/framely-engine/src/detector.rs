//! Detector contract.
//!
//! Every perceptual analyzer implements [`Detector`]. The engine only sees
//! the trait and the stage payloads, never analyzer-specific types.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use framely_models::{AnalysisConfig, Provenance, Shot, Stage, StagePayload, VideoMetadata};

use crate::error::DetectResult;

/// Inputs a detector sees besides the shot itself.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub video: &'a VideoMetadata,
    /// Effective configuration of the current attempt
    pub config: &'a AnalysisConfig,
}

/// A perceptual analyzer bound to one stage.
///
/// Absence of signal is not an error: a detector that finds nothing returns
/// an empty payload. Errors are reserved for exceptional conditions; GPU
/// stages signal accelerator exhaustion with
/// [`DetectorError::ResourceExhausted`](crate::error::DetectorError::ResourceExhausted).
#[async_trait]
pub trait Detector: Send + Sync {
    /// Analyze one shot. Earlier stages' results are available on `shot`.
    async fn detect(&self, shot: &Shot, ctx: StageContext<'_>) -> DetectResult<StagePayload>;

    /// Tool name recorded in provenance.
    fn name(&self) -> &'static str;

    /// Tool version recorded in provenance.
    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Model checkpoint, if any.
    fn checkpoint(&self) -> Option<&str> {
        None
    }
}

/// Provenance for one execution of `detector` on `stage`.
pub fn provenance_for(detector: &dyn Detector, stage: Stage, config: &AnalysisConfig) -> Provenance {
    let mut provenance =
        Provenance::new(detector.name(), detector.version(), &config.stage_params(stage));
    if let Some(checkpoint) = detector.checkpoint() {
        provenance = provenance.with_checkpoint(checkpoint);
    }
    provenance.stamped()
}

/// Detectors keyed by the stage they serve.
#[derive(Clone, Default)]
pub struct DetectorSet {
    detectors: BTreeMap<Stage, Arc<dyn Detector>>,
}

impl DetectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector for a stage, replacing any previous one.
    pub fn with(mut self, stage: Stage, detector: Arc<dyn Detector>) -> Self {
        self.detectors.insert(stage, detector);
        self
    }

    pub fn insert(&mut self, stage: Stage, detector: Arc<dyn Detector>) {
        self.detectors.insert(stage, detector);
    }

    pub fn get(&self, stage: Stage) -> Option<&Arc<dyn Detector>> {
        self.detectors.get(&stage)
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.detectors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.detectors.iter().map(|(stage, d)| (stage, d.name())))
            .finish()
    }
}
