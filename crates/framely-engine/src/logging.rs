//! Tracing setup and per-run logging.

use std::path::Path;

use framely_models::{GateReason, Report};
use tracing::{error, field, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::RunError;

/// Install the global tracing subscriber.
///
/// Colored output for development, JSON when `LOG_FORMAT=json`. The filter
/// comes from `RUST_LOG`, with `framely=info` added.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "framely=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    let result = if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
    };

    if result.is_err() {
        warn!("Tracing subscriber already installed");
    }
}

/// Structured logging for one analysis run.
///
/// Owns the run's span. The span starts with the video id and source path;
/// the shot count and final gate state are recorded on it as they become
/// known, so every event inside the run carries them.
#[derive(Debug, Clone)]
pub struct RunLogger {
    span: Span,
}

impl RunLogger {
    pub fn new(video_id: &str, source: &Path) -> Self {
        let span = tracing::info_span!(
            "run",
            video_id = %video_id,
            source = %source.display(),
            shots = field::Empty,
            state = field::Empty,
        );
        Self { span }
    }

    /// The run's span, for instrumenting its futures.
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn log_prepared(&self, shots: usize, frames: u64, has_audio: bool) {
        self.span.record("shots", shots as u64);
        self.span
            .in_scope(|| info!(frames, has_audio, "Video prepared"));
    }

    pub fn log_scenes(&self, scenes: usize) {
        self.span
            .in_scope(|| info!(scenes = scenes as u64, "Scenes assembled"));
    }

    pub fn log_gate_reason(&self, reason: GateReason) {
        self.span
            .in_scope(|| warn!(reason = %reason, "Quality gate lowered"));
    }

    pub fn log_completion(&self, report: &Report, elapsed_secs: f64) {
        self.span.record("state", report.status.state.as_str());
        self.span.in_scope(|| {
            info!(
                shots = report.shots.len() as u64,
                scenes = report.scenes.len() as u64,
                risks = report.risks.len() as u64,
                elapsed_secs,
                "Run completed"
            )
        });
    }

    pub fn log_failure(&self, err: &RunError, elapsed_secs: f64) {
        self.span.record("state", "error");
        self.span.in_scope(|| {
            error!(
                fatal = err.is_fatal(),
                elapsed_secs,
                "Run failed: {}", err
            )
        });
    }
}
