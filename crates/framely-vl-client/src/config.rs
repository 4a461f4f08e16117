//! VL client configuration.

use std::time::Duration;

/// Configuration for the reasoning service client.
#[derive(Debug, Clone)]
pub struct VlClientConfig {
    /// Base URL of the OpenAI-compatible API (including `/v1`)
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on images attached to one request
    pub max_images: usize,
}

impl Default for VlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://qwen:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model: "Qwen/Qwen2.5-VL-7B-Instruct".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            max_tokens: 512,
            temperature: 0.1,
            max_images: 12,
        }
    }
}

impl VlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("QWEN_API_BASE")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("QWEN_API_KEY").unwrap_or(defaults.api_key),
            model: std::env::var("QWEN_MODEL").unwrap_or(defaults.model),
            timeout: std::env::var("QWEN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("QWEN_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
