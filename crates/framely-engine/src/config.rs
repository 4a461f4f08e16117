//! Engine configuration loading.
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults of [`AnalysisConfig`]
//! 2. YAML file at `FRAMELY_CONFIG` (default `configs/limits.yaml`), optional
//! 3. `FRAMELY__<GROUP>__<KEY>` environment variables, e.g.
//!    `FRAMELY__RUNTIME__GPU_SEMAPHORE=4`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use framely_models::AnalysisConfig;
use tracing::{debug, info};

use crate::error::RunResult;

pub const DEFAULT_CONFIG_PATH: &str = "configs/limits.yaml";
const ENV_PREFIX: &str = "FRAMELY";

/// Loaded engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    /// File the configuration was layered from
    pub source: PathBuf,
}

impl EngineConfig {
    /// Load from `.env`, the config file and the environment.
    pub fn load() -> RunResult<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var("FRAMELY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Path::new(&path))
    }

    /// Load from an explicit file plus the process environment.
    pub fn load_from(path: &Path) -> RunResult<Self> {
        Self::build(path, None)
    }

    fn build(path: &Path, env: Option<HashMap<String, String>>) -> RunResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.to_path_buf()).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("runtime.oom_fallback_order")
                    .source(env),
            )
            .build()?;

        let analysis: AnalysisConfig = settings.try_deserialize()?;
        analysis.validate()?;

        info!(
            path = %path.display(),
            gpu_semaphore = analysis.runtime.gpu_semaphore,
            frame_stride = analysis.runtime.frame_stride,
            "Engine configuration loaded"
        );

        Ok(Self {
            analysis,
            source: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use framely_models::{FallbackStep, ShotFailurePolicy};
    use std::io::Write;

    fn yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            EngineConfig::build(Path::new("/nonexistent/limits.yaml"), no_env()).unwrap();
        assert_eq!(config.analysis, AnalysisConfig::default());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let file = yaml(
            "runtime:\n  gpu_semaphore: 4\n  shot_failure_policy: continue\n\
             coverage_thresholds:\n  stoi_pct: 80\n",
        );
        let config = EngineConfig::build(file.path(), no_env()).unwrap();
        assert_eq!(config.analysis.runtime.gpu_semaphore, 4);
        assert_eq!(
            config.analysis.runtime.shot_failure_policy,
            ShotFailurePolicy::Continue
        );
        assert_eq!(config.analysis.coverage_thresholds.stoi_pct, 80.0);
        assert_eq!(config.analysis.detect.tile.size, 640);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = yaml("runtime:\n  gpu_semaphore: 4\n");
        let env = HashMap::from([
            ("FRAMELY__RUNTIME__GPU_SEMAPHORE".to_string(), "3".to_string()),
            (
                "FRAMELY__RUNTIME__OOM_FALLBACK_ORDER".to_string(),
                "sr_off,sam2_off".to_string(),
            ),
        ]);
        let config = EngineConfig::build(file.path(), Some(env)).unwrap();
        assert_eq!(config.analysis.runtime.gpu_semaphore, 3);
        assert_eq!(
            config.analysis.runtime.oom_fallback_order,
            vec![FallbackStep::SrOff, FallbackStep::Sam2Off]
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = yaml("detect:\n  tile:\n    size: 256\n    stride: 512\n");
        let err = EngineConfig::build(file.path(), no_env()).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }
}
