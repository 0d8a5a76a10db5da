//! Cerebras inference backend.
//!
//! Posts OpenAI-style chat completions to the Cerebras cloud API.
//! Auth priority: config key → `CEREBRAS_API_KEY`.
//!
//! Transient failures retry with exponential backoff; quota failures
//! (HTTP 429 or a quota-flavored error body) abort immediately so the
//! caller's admission control can react — with the rate limiter in front
//! of this backend they indicate a misconfigured limit, not bad luck.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::config::ProviderConfig;
use crate::error::{GuardError, Result};

use super::{parse_provider_error, GenerateOptions, GenerationBackend};

/// Chat completions endpoint.
const CEREBRAS_API_URL: &str = "https://api.cerebras.ai/v1/chat/completions";

/// Default model when none is configured.
const DEFAULT_CEREBRAS_MODEL: &str = "llama-3.3-70b";

/// Maximum attempts per generation call.
const MAX_RETRIES: u32 = 3;

/// Base backoff in seconds; doubles per attempt (5s, 10s, ...).
const BACKOFF_BASE_SECS: u64 = 5;

/// Overall per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Generation backend for the Cerebras cloud API.
pub struct CerebrasBackend {
    client: Client,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for CerebrasBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CerebrasBackend")
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl CerebrasBackend {
    /// Create a backend with an explicit key and optional model override.
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_CEREBRAS_MODEL.to_string()),
        })
    }

    /// Create a backend from configuration, falling back to
    /// `CEREBRAS_API_KEY` for the key.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("CEREBRAS_API_KEY").ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| {
                GuardError::Config(
                    "CEREBRAS_API_KEY not found in config or environment".to_string(),
                )
            })?;
        Self::new(api_key, config.model.clone())
    }

    /// Build the chat-completions request body.
    fn build_body(&self, prompt: &str, options: &GenerateOptions) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": options.temperature,
            "max_completion_tokens": options.max_tokens,
        })
    }

    /// Extract the completion text from a chat-completions response.
    fn extract_text(response: &Value) -> Option<String> {
        let content = response["choices"][0]["message"]["content"].as_str()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Issue a single request and map the outcome onto a crate error.
    async fn attempt(&self, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(CEREBRAS_API_URL)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GuardError::Provider(format!("Cerebras request failed: {e}")))?;

        if response.status().is_success() {
            let json: Value = response.json().await.map_err(|e| {
                GuardError::Provider(format!("Failed to parse Cerebras response: {e}"))
            })?;
            return Self::extract_text(&json)
                .ok_or_else(|| GuardError::Provider("empty response from Cerebras API".to_string()));
        }

        let status = response.status().as_u16();
        let error_text = response.text().await.unwrap_or_default();

        // Surface the API's own message when the error body is JSON.
        let body_msg = serde_json::from_str::<Value>(&error_text)
            .ok()
            .and_then(|v| {
                v["error"]["message"]
                    .as_str()
                    .map(|s| format!("Cerebras API error: {s}"))
            })
            .unwrap_or_else(|| format!("Cerebras API error: {error_text}"));

        Err(parse_provider_error(status, &body_msg))
    }
}

#[async_trait]
impl GenerationBackend for CerebrasBackend {
    fn name(&self) -> &str {
        "cerebras"
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            "Cerebras generation request"
        );
        let body = self.build_body(prompt, options);

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            match self.attempt(&body).await {
                Ok(text) => {
                    debug!(attempt, "Cerebras generation succeeded");
                    return Ok(text);
                }
                // Quota failures are not transient; retrying burns budget.
                Err(err @ GuardError::RateLimited(_)) => {
                    error!(%err, "Cerebras quota exhausted");
                    return Err(err);
                }
                Err(err) => {
                    warn!(attempt = attempt + 1, max = MAX_RETRIES, %err, "Cerebras attempt failed");
                    last_error = Some(err);
                    if attempt + 1 < MAX_RETRIES {
                        let backoff = Duration::from_secs(BACKOFF_BASE_SECS * (1 << attempt));
                        debug!(backoff_secs = backoff.as_secs(), "retrying");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(GuardError::Provider(format!(
            "Failed to call Cerebras API after {MAX_RETRIES} attempts: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}
