//! Reasoning service HTTP client.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use framely_models::{ReasoningOutput, Scene, Shot};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::VlClientConfig;
use crate::error::{VlError, VlResult};
use crate::prompts::{scene_prompt, shot_prompt, SCENE_SYSTEM, SHOT_SYSTEM};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ContentPart, MessageContent};

/// Client for the vision-language reasoning service.
pub struct VlClient {
    http: Client,
    config: VlClientConfig,
}

impl VlClient {
    /// Create a new client.
    pub fn new(config: VlClientConfig) -> VlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(VlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> VlResult<Self> {
        Self::new(VlClientConfig::from_env())
    }

    pub fn config(&self) -> &VlClientConfig {
        &self.config
    }

    /// Check whether the service answers its model listing.
    pub async fn health_check(&self) -> VlResult<bool> {
        let url = format!("{}/models", self.config.base_url);

        match self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                warn!("Reasoning service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Reasoning service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Reason about one shot from its detector outputs and frames.
    ///
    /// Frames are sampled evenly down to the configured image limit.
    pub async fn analyze_shot(&self, shot: &Shot, frame_paths: &[String]) -> ReasoningOutput {
        let frames = sample_evenly(frame_paths, self.config.max_images);
        let prompt = shot_prompt(shot);
        into_output(self.chat(SHOT_SYSTEM, &prompt, &frames).await)
    }

    /// Produce a narrative for a scene from its member shots. No images are sent.
    pub async fn analyze_scene(&self, scene: &Scene, shots: &[&Shot]) -> ReasoningOutput {
        let prompt = scene_prompt(scene, shots);
        into_output(self.chat(SCENE_SYSTEM, &prompt, &[]).await)
    }

    /// Send one chat completion and parse the answer as a JSON object.
    pub async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        image_paths: &[String],
    ) -> VlResult<Map<String, Value>> {
        let user_content = if image_paths.is_empty() {
            MessageContent::Text(user_prompt.to_string())
        } else {
            let mut parts = vec![ContentPart::Text {
                text: user_prompt.to_string(),
            }];
            for path in image_paths.iter().take(self.config.max_images) {
                match tokio::fs::read(path).await {
                    Ok(bytes) => parts.push(ContentPart::jpeg_base64(&BASE64.encode(bytes))),
                    Err(e) => warn!("Failed to encode image {}: {}", path, e),
                }
            }
            MessageContent::Parts(parts)
        };

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_content)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!(images = image_paths.len(), "Sending reasoning request to {}", url);

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.config.api_key)
                    .json(&request)
                    .send()
                    .await
                    .map_err(VlError::Network)?;

                let status = response.status();
                if status == StatusCode::SERVICE_UNAVAILABLE
                    || status == StatusCode::TOO_MANY_REQUESTS
                {
                    return Err(VlError::ServiceUnavailable(format!(
                        "reasoning service returned {}",
                        status
                    )));
                }
                Ok(response)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VlError::RequestFailed(format!(
                "reasoning service returned {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| VlError::InvalidResponse("response has no message content".into()))?;

        parse_json_content(&content)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> VlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = VlResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Reasoning request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(VlError::RequestFailed("Unknown error".to_string())))
    }
}

fn into_output(result: VlResult<Map<String, Value>>) -> ReasoningOutput {
    match result {
        Ok(content) => ReasoningOutput::from_content(content),
        Err(VlError::Parse { raw }) => {
            warn!("Reasoning answer was not valid JSON");
            ReasoningOutput::failed("Failed to parse JSON").with_raw(raw)
        }
        Err(e) => {
            warn!("Error calling reasoning service: {}", e);
            ReasoningOutput::failed(e.to_string())
        }
    }
}

/// Parse a model answer as a JSON object.
///
/// Accepts bare JSON as well as JSON wrapped in a markdown code fence.
pub fn parse_json_content(content: &str) -> VlResult<Map<String, Value>> {
    let parse_failed = || VlError::Parse {
        raw: content.to_string(),
    };

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content.trim()) {
        return Ok(map);
    }

    let fenced = if let Some((_, rest)) = content.split_once("```json") {
        rest.split("```").next()
    } else {
        content.split("```").nth(1)
    };

    match fenced.map(|body| serde_json::from_str::<Value>(body.trim())) {
        Some(Ok(Value::Object(map))) => Ok(map),
        _ => Err(parse_failed()),
    }
}

/// Pick at most `max` items spread evenly across `items`.
pub fn sample_evenly(items: &[String], max: usize) -> Vec<String> {
    if max == 0 {
        return Vec::new();
    }
    if items.len() <= max {
        return items.to_vec();
    }
    let step = items.len() / max;
    (0..max).map(|i| items[i * step].clone()).collect()
}
