//! Client for the vision-language reasoning service.
//!
//! The service speaks the OpenAI-compatible chat completions protocol (as
//! served by vLLM). The client builds shot and scene prompts from analysis
//! results, attaches sampled frames as base64 images and parses the model's
//! JSON answer. Analysis calls never fail: service errors come back as an
//! error payload on the returned [`framely_models::ReasoningOutput`].

pub mod client;
pub mod config;
pub mod error;
pub mod prompts;
pub mod types;

pub use client::{parse_json_content, sample_evenly, VlClient};
pub use config::VlClientConfig;
pub use error::{VlError, VlResult};
