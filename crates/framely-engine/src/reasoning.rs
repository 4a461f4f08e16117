//! Reasoning service seam.

use async_trait::async_trait;
use framely_models::{ReasoningOutput, Scene, Shot};
use framely_vl_client::VlClient;

/// Out-of-process vision-language reasoning.
///
/// Implementations never fail: service errors are returned as an error
/// payload (see [`ReasoningOutput::failed`]).
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn analyze_shot(&self, shot: &Shot, frame_paths: &[String]) -> ReasoningOutput;

    async fn analyze_scene(&self, scene: &Scene, shots: &[&Shot]) -> ReasoningOutput;

    fn name(&self) -> &'static str;

    /// Model behind the service, recorded as the provenance checkpoint.
    fn checkpoint(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
impl ReasoningService for VlClient {
    async fn analyze_shot(&self, shot: &Shot, frame_paths: &[String]) -> ReasoningOutput {
        VlClient::analyze_shot(self, shot, frame_paths).await
    }

    async fn analyze_scene(&self, scene: &Scene, shots: &[&Shot]) -> ReasoningOutput {
        VlClient::analyze_scene(self, scene, shots).await
    }

    fn name(&self) -> &'static str {
        "qwen_vl"
    }

    fn checkpoint(&self) -> Option<&str> {
        Some(&self.config().model)
    }
}
