//! Prometheus metrics for the analysis engine.
//!
//! Process-wide metrics go through the `metrics` facade. Each run also keeps
//! a [`RunMetrics`] of its own, snapshotted into the report.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use framely_models::{RunMetricsSnapshot, Stage};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const OOM_TRIPS_TOTAL: &str = "framely_oom_trips_total";
    pub const RETRIES_TOTAL: &str = "framely_retries_total";
    pub const STAGE_FAILURES_TOTAL: &str = "framely_stage_failures_total";
    pub const STAGE_DURATION_SECONDS: &str = "framely_stage_duration_seconds";
    pub const RUN_DURATION_SECONDS: &str = "framely_run_duration_seconds";
    pub const POOL_ACTIVE: &str = "framely_pool_active";
    pub const SHOTS_FAILED_TOTAL: &str = "framely_shots_failed_total";
}

/// Record an accelerator exhaustion event.
pub fn record_oom_trip(stage: Stage) {
    let labels = [("stage", stage.to_string())];
    counter!(names::OOM_TRIPS_TOTAL, &labels).increment(1);
}

/// Record a whole-shot retry.
pub fn record_retry() {
    counter!(names::RETRIES_TOTAL).increment(1);
}

/// Record a stage-local failure.
pub fn record_stage_failure(stage: Stage) {
    let labels = [("stage", stage.to_string())];
    counter!(names::STAGE_FAILURES_TOTAL, &labels).increment(1);
}

/// Record a stage's execution time.
pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished run.
pub fn record_run_duration(state: &str, duration_secs: f64) {
    let labels = [("state", state.to_string())];
    histogram!(names::RUN_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a shot that failed after its retry.
pub fn record_shot_failed() {
    counter!(names::SHOTS_FAILED_TOTAL).increment(1);
}

/// Update the occupancy gauge of one pool.
pub fn set_pool_active(pool: &str, active: usize) {
    let labels = [("pool", pool.to_string())];
    gauge!(names::POOL_ACTIVE, &labels).set(active as f64);
}

/// Counters for one run.
#[derive(Debug, Default)]
pub struct RunMetrics {
    oom_trips: AtomicU64,
    retries: AtomicU64,
    stage_failures: AtomicU64,
    latency_ms: Mutex<BTreeMap<String, u64>>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn oom_trip(&self, stage: Stage) {
        self.oom_trips.fetch_add(1, Ordering::Relaxed);
        record_oom_trip(stage);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        record_retry();
    }

    pub fn stage_failure(&self, stage: Stage) {
        self.stage_failures.fetch_add(1, Ordering::Relaxed);
        record_stage_failure(stage);
    }

    pub fn stage_timing(&self, stage: Stage, elapsed: Duration) {
        record_stage_duration(stage, elapsed.as_secs_f64());
        self.add_latency(stage.as_str(), elapsed);
    }

    /// Accumulate wall time under an operation name.
    pub fn add_latency(&self, operation: &str, elapsed: Duration) {
        if let Ok(mut latency) = self.latency_ms.lock() {
            *latency.entry(operation.to_string()).or_insert(0) += elapsed.as_millis() as u64;
        }
    }

    pub fn oom_trips(&self) -> u64 {
        self.oom_trips.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RunMetricsSnapshot {
        RunMetricsSnapshot {
            oom_trips: self.oom_trips(),
            retries: self.retries(),
            stage_failures: self.stage_failures.load(Ordering::Relaxed),
            latency_ms: self
                .latency_ms
                .lock()
                .map(|latency| latency.clone())
                .unwrap_or_default(),
        }
    }
}
