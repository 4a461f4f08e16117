//! Run coordination.
//!
//! A run takes one source video to one report:
//! preparation, shot fan-out through the [`ShotPipeline`], scene assembly,
//! scene narratives, coverage, the quality gate and risk detection. A run
//! that fails produces no report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use framely_models::{
    AblationFlags, AnalysisConfig, Calibration, GateReason, GateState, Provenance, Report,
    ReportStatus, Shot, ShotFailurePolicy, VideoInfo, VideoMetadata, SCHEMA_VERSION,
};
use futures::future::join_all;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::coverage::{compute_coverage, evaluate_gate, shot_warnings};
use crate::detector::DetectorSet;
use crate::error::{RunError, RunResult};
use crate::hashing::sha256_file;
use crate::logging::RunLogger;
use crate::metrics::{self, RunMetrics};
use crate::pipeline::ShotPipeline;
use crate::reasoning::ReasoningService;
use crate::resource_pool::ResourcePool;
use crate::risks::{detect_risks, ShotFailure};
use crate::scenes::assemble;
use crate::stage_graph::StageGraph;
use crate::stats::{global_stats, track_summaries};
use crate::tracking::{TrackKey, TrackState};

/// Output of preparation: metadata plus shot boundaries with their frames.
#[derive(Debug, Clone)]
pub struct PreparedVideo {
    pub metadata: VideoMetadata,
    pub shots: Vec<Shot>,
    /// Provenance of the preparation tooling, if it reports one
    pub provenance: Option<Provenance>,
}

/// Decodes a source video into metadata, shots and extracted frames.
#[async_trait]
pub trait Preparer: Send + Sync {
    async fn prepare(
        &self,
        video_id: &str,
        source: &Path,
        config: &AnalysisConfig,
    ) -> RunResult<PreparedVideo>;
}

/// One analysis request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub video_id: String,
    pub source: PathBuf,
    /// Extra ablation flags for this run, added to the configured ones
    pub ablations: Option<AblationFlags>,
}

impl RunRequest {
    pub fn new(video_id: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            video_id: video_id.into(),
            source: source.into(),
            ablations: None,
        }
    }

    /// Request with a generated video id.
    pub fn for_source(source: impl Into<PathBuf>) -> Self {
        Self::new(Uuid::new_v4().to_string(), source)
    }

    pub fn with_ablations(mut self, ablations: AblationFlags) -> Self {
        self.ablations = Some(ablations);
        self
    }
}

/// Drives runs end to end.
pub struct RunCoordinator {
    config: AnalysisConfig,
    preparer: Arc<dyn Preparer>,
    pipeline: ShotPipeline,
    reasoner: Arc<dyn ReasoningService>,
}

impl RunCoordinator {
    /// Create a coordinator with a pool sized by `runtime.gpu_semaphore`.
    pub fn new(
        config: AnalysisConfig,
        preparer: Arc<dyn Preparer>,
        detectors: DetectorSet,
        reasoner: Arc<dyn ReasoningService>,
    ) -> RunResult<Self> {
        let pool = ResourcePool::new(config.runtime.gpu_semaphore);
        Self::with_pool(config, preparer, detectors, reasoner, pool)
    }

    /// Create a coordinator sharing an existing pool.
    pub fn with_pool(
        config: AnalysisConfig,
        preparer: Arc<dyn Preparer>,
        detectors: DetectorSet,
        reasoner: Arc<dyn ReasoningService>,
        pool: ResourcePool,
    ) -> RunResult<Self> {
        config.validate()?;
        let pipeline = ShotPipeline::new(
            Arc::new(StageGraph::standard()),
            pool,
            Arc::new(detectors),
            Arc::clone(&reasoner),
        );
        Ok(Self {
            config,
            preparer,
            pipeline,
            reasoner,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn pool(&self) -> &ResourcePool {
        self.pipeline.pool()
    }

    /// Analyze one video.
    pub async fn run(&self, request: RunRequest) -> RunResult<Report> {
        let logger = RunLogger::new(&request.video_id, &request.source);
        let started = Instant::now();

        let result = self
            .run_inner(&request, &logger)
            .instrument(logger.span())
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(report) => {
                metrics::record_run_duration(report.status.state.as_str(), elapsed);
                logger.log_completion(report, elapsed);
            }
            Err(e) => {
                metrics::record_run_duration("error", elapsed);
                logger.log_failure(e, elapsed);
            }
        }

        result
    }

    async fn run_inner(&self, request: &RunRequest, logger: &RunLogger) -> RunResult<Report> {
        let started = Instant::now();
        let metrics = RunMetrics::new();

        // Ablations are folded in once; every shot sees the same effective config.
        let mut config = self.config.clone();
        if let Some(ablations) = &request.ablations {
            config.ablation = config.ablation.union(ablations);
        }
        let config = Arc::new(config.with_ablations());

        if !tokio::fs::try_exists(&request.source).await.unwrap_or(false) {
            return Err(RunError::SourceNotFound(request.source.clone()));
        }

        let prep_started = Instant::now();
        let prepared = self
            .preparer
            .prepare(&request.video_id, &request.source, &config)
            .await?;
        metrics.add_latency("prep", prep_started.elapsed());

        let PreparedVideo {
            metadata: video,
            shots,
            provenance: prep_provenance,
        } = prepared;
        if shots.is_empty() {
            return Err(RunError::NoShots(request.video_id.clone()));
        }
        logger.log_prepared(shots.len(), video.frames, video.has_audio());

        let sha256 = sha256_file(&request.source).await?;
        let mut provenance = vec![
            Provenance::with_hash("ingest", env!("CARGO_PKG_VERSION"), &sha256).stamped(),
        ];
        provenance.extend(prep_provenance);
        provenance.push(
            Provenance::new(
                "framely_engine",
                env!("CARGO_PKG_VERSION"),
                &serde_json::to_value(config.as_ref())?,
            )
            .stamped(),
        );

        let (mut shots, failures) = self.analyze_shots(&video, shots, &config, &metrics).await?;

        for shot in &mut shots {
            let warnings = shot_warnings(shot, &video);
            shot.warnings.extend(warnings);
        }

        let mut scenes = assemble(&shots, config.scenes.brightness_threshold);
        logger.log_scenes(scenes.len());

        let narratives = join_all(scenes.iter().map(|scene| {
            let members: Vec<&Shot> = shots.iter().filter(|s| scene.contains(&s.shot_id)).collect();
            async move {
                let _permit = self.pipeline.pool().acquire().await?;
                Ok::<_, RunError>(self.reasoner.analyze_scene(scene, &members).await)
            }
        }))
        .await;
        for (scene, narrative) in scenes.iter_mut().zip(narratives) {
            scene.narrative = Some(narrative?);
        }

        let coverage = compute_coverage(&video, &shots, &config);
        let mut decision = evaluate_gate(&coverage, &config.coverage_thresholds);
        if !failures.is_empty() {
            decision.escalate(GateState::Failed, GateReason::ShotAnalysisFailed);
        }
        for reason in &decision.reasons {
            logger.log_gate_reason(*reason);
        }

        let risks = detect_risks(&shots, &config, &failures);
        let global = global_stats(&video, &shots);
        let tracks = track_summaries(&shots);

        metrics.add_latency("run", started.elapsed());
        debug!(
            risks = risks.len(),
            tracks = tracks.len(),
            state = %decision.state,
            "Report assembled"
        );

        Ok(Report {
            schema_version: SCHEMA_VERSION.to_string(),
            video: VideoInfo {
                video_id: video.video_id.clone(),
                path: video.path.clone(),
                sha256,
                metrics: metrics.snapshot(),
            },
            global_stats: global,
            scenes,
            shots,
            tracks,
            status: ReportStatus::new(decision, coverage),
            risks,
            provenance,
            calibration: Calibration::standard(),
        })
    }

    /// Run every shot through the pipeline and apply the failure policy.
    ///
    /// Returns the analyzed shots in shot order and the shots that failed.
    async fn analyze_shots(
        &self,
        video: &VideoMetadata,
        shots: Vec<Shot>,
        config: &Arc<AnalysisConfig>,
        metrics: &RunMetrics,
    ) -> RunResult<(Vec<Shot>, Vec<ShotFailure>)> {
        let pipeline = &self.pipeline;
        let outcomes = join_all(shots.into_iter().map(|shot| {
            let shot_id = shot.shot_id.clone();
            let tracks = TrackState::new(
                TrackKey::new(&video.video_id, &shot.shot_id),
                config.detect.track.clone(),
            );
            let config = Arc::clone(config);
            async move {
                let outcome = pipeline.run(video, shot, config, tracks, metrics).await;
                (shot_id, outcome)
            }
        }))
        .await;

        let mut analyzed = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (shot_id, outcome) in outcomes {
            match outcome {
                Ok(shot) => analyzed.push(shot),
                Err(error) => {
                    metrics::record_shot_failed();
                    match config.runtime.shot_failure_policy {
                        ShotFailurePolicy::FailRun => return Err(error.into()),
                        ShotFailurePolicy::Continue => {
                            warn!(
                                video_id = %video.video_id,
                                shot_id = %shot_id,
                                "Shot failed, continuing: {}", error
                            );
                            failures.push(ShotFailure {
                                shot_id,
                                error: error.to_string(),
                            });
                        }
                    }
                }
            }
        }

        analyzed.sort_by_key(|shot| shot.index);
        Ok((analyzed, failures))
    }
}
