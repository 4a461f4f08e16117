//! Per-shot analysis pipeline.
//!
//! A shot moves through four phases:
//!
//! 1. GPU: one pool slot for the whole phase; accelerator stages run one
//!    after another in graph order, then the tracker assigns track ids.
//! 2. CPU: CPU stages run concurrently; a failing stage does not affect its
//!    siblings. The pool is not touched.
//! 3. Audio: only when the video has an audio track.
//! 4. Reasoning: one pool slot again; the reasoner sees sampled frames and
//!    everything gathered so far.
//!
//! If a GPU stage exhausts the accelerator, the configured fallback ladder
//! derives a degraded configuration for this shot alone and the whole shot
//! is analyzed once more. A second exhaustion fails the shot.

use std::sync::Arc;
use std::time::Instant;

use framely_models::{
    AnalysisConfig, DetectorResult, FallbackStep, Provenance, Shot, Stage, StagePayload,
    VideoMetadata,
};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::detector::{provenance_for, Detector, DetectorSet, StageContext};
use crate::error::{DetectResult, DetectorError, ShotError, ShotResult};
use crate::metrics::RunMetrics;
use crate::reasoning::ReasoningService;
use crate::resource_pool::ResourcePool;
use crate::stage_graph::{Phase, StageGraph};
use crate::tracking::TrackState;

/// A shot gets its first attempt plus one degraded retry.
pub const MAX_ATTEMPTS: u32 = 2;

/// Why an attempt stopped early.
#[derive(Debug)]
enum AttemptError {
    Exhausted { stage: Stage, error: DetectorError },
    Shot(ShotError),
}

/// Runs single shots through the stage graph.
#[derive(Clone)]
pub struct ShotPipeline {
    graph: Arc<StageGraph>,
    pool: ResourcePool,
    detectors: Arc<DetectorSet>,
    reasoner: Arc<dyn ReasoningService>,
}

impl ShotPipeline {
    pub fn new(
        graph: Arc<StageGraph>,
        pool: ResourcePool,
        detectors: Arc<DetectorSet>,
        reasoner: Arc<dyn ReasoningService>,
    ) -> Self {
        Self {
            graph,
            pool,
            detectors,
            reasoner,
        }
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Analyze one shot.
    ///
    /// `config` is the run's effective configuration; degraded retries derive
    /// their own copy and never change it. `tracks` is this shot's tracker
    /// state and is consumed by the tracking step.
    pub async fn run(
        &self,
        video: &VideoMetadata,
        mut shot: Shot,
        config: Arc<AnalysisConfig>,
        mut tracks: TrackState,
        metrics: &RunMetrics,
    ) -> ShotResult<Shot> {
        let mut applied: Vec<FallbackStep> = Vec::new();
        let mut attempt_config = Arc::clone(&config);

        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .attempt(video, &mut shot, &attempt_config, &mut tracks, metrics)
                .await;

            match result {
                Ok(()) => {
                    debug!(
                        shot_id = %shot.shot_id,
                        attempt,
                        tracks = tracks.summaries().len(),
                        "Shot analysis complete"
                    );
                    return Ok(shot);
                }
                Err(AttemptError::Shot(e)) => return Err(e),
                Err(AttemptError::Exhausted { stage, error }) => {
                    metrics.oom_trip(stage);
                    warn!(
                        video_id = %video.video_id,
                        shot_id = %shot.shot_id,
                        stage = %stage,
                        attempt,
                        "Accelerator exhausted: {}", error
                    );

                    if attempt == MAX_ATTEMPTS {
                        return Err(ShotError::ResourceExhausted {
                            shot_id: shot.shot_id.clone(),
                            attempts: attempt,
                        });
                    }

                    for step in &config.runtime.oom_fallback_order {
                        if applied.contains(step) || shot.has_flag(step.flag()) {
                            continue;
                        }
                        applied.push(*step);
                        shot.add_flag(step.flag());
                    }
                    info!(
                        shot_id = %shot.shot_id,
                        steps = ?applied,
                        "Retrying shot with degraded configuration"
                    );

                    attempt_config = Arc::new(config.degraded(&applied));
                    shot.reset_analysis();
                    tracks.reset();
                    metrics.retry();
                }
            }
        }

        Err(ShotError::internal(format!(
            "shot {} left the retry loop without a result",
            shot.shot_id
        )))
    }

    async fn attempt(
        &self,
        video: &VideoMetadata,
        shot: &mut Shot,
        config: &AnalysisConfig,
        tracks: &mut TrackState,
        metrics: &RunMetrics,
    ) -> Result<(), AttemptError> {
        let ctx = StageContext { video, config };

        self.gpu_phase(shot, ctx, tracks, metrics).await?;
        self.cpu_phase(shot, ctx, metrics).await;
        self.audio_phase(shot, ctx, metrics).await;
        self.reasoning_phase(shot, ctx, metrics).await?;

        Ok(())
    }

    async fn gpu_phase(
        &self,
        shot: &mut Shot,
        ctx: StageContext<'_>,
        tracks: &mut TrackState,
        metrics: &RunMetrics,
    ) -> Result<(), AttemptError> {
        let _permit = self.pool.acquire().await.map_err(AttemptError::Shot)?;

        for stage in self.graph.stages_in(Phase::Gpu) {
            let Some(detector) = self.runnable(stage, ctx) else {
                continue;
            };

            match execute(detector.as_ref(), stage, shot, ctx, metrics).await {
                Ok(result) => {
                    shot.detectors.insert(stage, result);
                }
                Err(error) if error.is_resource_exhaustion() => {
                    return Err(AttemptError::Exhausted { stage, error });
                }
                Err(error) => {
                    let result = absorb(detector.as_ref(), stage, shot, ctx, error, metrics);
                    shot.detectors.insert(stage, result);
                }
            }
        }

        if let Some(objects) = shot.objects_mut() {
            tracks.assign(objects);
        }

        Ok(())
    }

    async fn cpu_phase(&self, shot: &mut Shot, ctx: StageContext<'_>, metrics: &RunMetrics) {
        let runnable: Vec<(Stage, Arc<dyn Detector>)> = self
            .graph
            .stages_in(Phase::Cpu)
            .into_iter()
            .filter_map(|stage| self.runnable(stage, ctx).map(|d| (stage, Arc::clone(d))))
            .collect();

        let snapshot: &Shot = shot;
        let futures = runnable.iter().map(|(stage, detector)| async move {
            let result = match execute(detector.as_ref(), *stage, snapshot, ctx, metrics).await {
                Ok(result) => result,
                Err(error) => absorb(detector.as_ref(), *stage, snapshot, ctx, error, metrics),
            };
            (*stage, result)
        });
        let results = join_all(futures).await;

        for (stage, result) in results {
            shot.detectors.insert(stage, result);
        }
    }

    async fn audio_phase(&self, shot: &mut Shot, ctx: StageContext<'_>, metrics: &RunMetrics) {
        if !ctx.video.has_audio() {
            return;
        }

        for stage in self.graph.stages_in(Phase::Audio) {
            let Some(detector) = self.runnable(stage, ctx) else {
                continue;
            };
            let result = match execute(detector.as_ref(), stage, shot, ctx, metrics).await {
                Ok(result) => result,
                Err(error) => absorb(detector.as_ref(), stage, shot, ctx, error, metrics),
            };
            shot.detectors.insert(stage, result);
        }
    }

    async fn reasoning_phase(
        &self,
        shot: &mut Shot,
        ctx: StageContext<'_>,
        metrics: &RunMetrics,
    ) -> Result<(), AttemptError> {
        for stage in self.graph.stages_in(Phase::Reasoning) {
            let _permit = self.pool.acquire().await.map_err(AttemptError::Shot)?;

            let frames: Vec<String> = shot
                .frames
                .iter()
                .take(ctx.config.runtime.qwen_context_max_frames)
                .map(|frame| frame.path.clone())
                .collect();

            let started = Instant::now();
            let output = self.reasoner.analyze_shot(shot, &frames).await;
            metrics.stage_timing(stage, started.elapsed());

            if let Some(error) = &output.error {
                warn!(
                    shot_id = %shot.shot_id,
                    stage = %stage,
                    "Reasoning returned an error payload: {}", error
                );
            }

            let mut provenance = Provenance::new(
                self.reasoner.name(),
                env!("CARGO_PKG_VERSION"),
                &ctx.config.stage_params(stage),
            );
            if let Some(checkpoint) = self.reasoner.checkpoint() {
                provenance = provenance.with_checkpoint(checkpoint);
            }

            shot.detectors.insert(
                stage,
                DetectorResult {
                    payload: StagePayload::Empty,
                    provenance: provenance.stamped(),
                    error: output.error.clone(),
                },
            );
            shot.reasoning = Some(output);
        }

        Ok(())
    }

    /// The detector for `stage`, if it is registered and enabled.
    fn runnable(&self, stage: Stage, ctx: StageContext<'_>) -> Option<&Arc<dyn Detector>> {
        if !stage_enabled(stage, ctx) {
            return None;
        }
        self.detectors.get(stage)
    }
}

/// Whether the effective configuration enables `stage`.
pub fn stage_enabled(stage: Stage, ctx: StageContext<'_>) -> bool {
    let detect = &ctx.config.detect;
    match stage {
        Stage::YoloTiled => detect.two_pass.enabled,
        Stage::Superres | Stage::YoloFine => detect.superres.enabled,
        Stage::Sam2Refine => detect.sam2.enabled,
        Stage::AudioEng => ctx.video.has_audio(),
        _ => true,
    }
}

async fn execute(
    detector: &dyn Detector,
    stage: Stage,
    shot: &Shot,
    ctx: StageContext<'_>,
    metrics: &RunMetrics,
) -> DetectResult<DetectorResult> {
    let started = Instant::now();
    let result = detector.detect(shot, ctx).await;
    metrics.stage_timing(stage, started.elapsed());

    let payload = result?;
    Ok(DetectorResult::new(
        payload,
        provenance_for(detector, stage, ctx.config),
    ))
}

/// Turn a stage-local failure into an empty result.
fn absorb(
    detector: &dyn Detector,
    stage: Stage,
    shot: &Shot,
    ctx: StageContext<'_>,
    error: DetectorError,
    metrics: &RunMetrics,
) -> DetectorResult {
    metrics.stage_failure(stage);
    warn!(
        video_id = %ctx.video.video_id,
        shot_id = %shot.shot_id,
        stage = %stage,
        "Stage failed, continuing with empty result: {}", error
    );
    DetectorResult::degraded(
        stage,
        provenance_for(detector, stage, ctx.config),
        error.to_string(),
    )
}
