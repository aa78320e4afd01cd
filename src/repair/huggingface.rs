//! HuggingFace inference API fixer
//!
//! Posts the failing Dockerfile and error log to a text-generation endpoint
//! and extracts the repaired content from the free-text completion. Every
//! failure mode (non-2xx, service error field, empty payload, timeout,
//! transport error) degrades to `None` per the repair contract.

use super::DockerfileFixer;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default request timeout for repair calls
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Generation budget matching the repair prompt size
const MAX_NEW_TOKENS: u32 = 2000;
const TEMPERATURE: f32 = 0.2;

/// HTTP client for a HuggingFace-style text-generation endpoint
pub struct HuggingFaceFixer {
    endpoint: String,
    api_token: String,
    http_client: Client,
    timeout: Duration,
}

impl HuggingFaceFixer {
    /// Creates a fixer with the default timeout.
    pub fn new(endpoint: String, api_token: String) -> Self {
        Self::with_timeout(endpoint, api_token, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a fixer with a custom request timeout.
    ///
    /// A timed-out repair call is treated exactly like an empty response.
    pub fn with_timeout(endpoint: String, api_token: String, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            endpoint,
            api_token,
            http_client,
            timeout,
        }
    }

    fn build_prompt(dockerfile: &str, error_log: &str) -> String {
        format!(
            "The following Dockerfile failed to build due to the errors listed below. \
             Please analyze the Dockerfile and the error logs, and provide a corrected \
             version of the Dockerfile. Only return the fixed Dockerfile without any \
             additional text. Make sure to give space after RUN Command. \
             Dockerfile:\n{} Error Logs:\n{}. Fixed Dockerfile:",
            dockerfile, error_log
        )
    }

    async fn generate(&self, prompt: String) -> Option<String> {
        let request = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: MAX_NEW_TOKENS,
                temperature: TEMPERATURE,
                stop: vec!["Fixed Dockerfile:".to_string()],
            },
        };

        debug!(
            prompt_length = request.inputs.len(),
            "Sending repair request"
        );
        let start = Instant::now();

        let response = match self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("Repair request timed out after {:?}", self.timeout);
                return None;
            }
            Err(e) => {
                warn!("Repair request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Repair service returned error status: {}", body);
            return None;
        }

        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to parse repair response: {}", e);
                return None;
            }
        };

        if let Some(service_error) = payload.get("error").and_then(Value::as_str) {
            warn!("Repair service reported an error: {}", service_error);
            return None;
        }

        let generated = payload
            .get(0)
            .and_then(|entry| entry.get("generated_text"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty());

        match generated {
            Some(text) => {
                info!(
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "Repair service returned a completion"
                );
                Some(text.to_string())
            }
            None => {
                warn!("Repair service returned no generated text");
                None
            }
        }
    }
}

#[async_trait]
impl DockerfileFixer for HuggingFaceFixer {
    async fn repair(&self, dockerfile: &str, error_log: &str) -> Option<String> {
        let prompt = Self::build_prompt(dockerfile, error_log);
        let generated = self.generate(prompt).await?;
        super::extract_dockerfile(&generated)
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}

impl fmt::Debug for HuggingFaceFixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingFaceFixer")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Request payload for the text-generation endpoint
#[derive(Debug, Serialize)]
struct GenerationRequest {
    inputs: String,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    stop: Vec<String>,
}
