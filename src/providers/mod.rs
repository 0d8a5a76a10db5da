//! Generation backends and the admission-control plumbing around them.
//!
//! [`GenerationBackend`] is the single narrow seam to the external LLM
//! API: one operation, `generate(prompt, options) -> text`. Concrete
//! providers implement it; decorators such as [`GuardedBackend`] wrap it.
//! Which concrete backend runs is decided once, at construction time —
//! never by runtime type inspection.

pub mod cerebras;
pub mod guard;
pub mod rate_limiter;

pub use cerebras::CerebrasBackend;
pub use guard::GuardedBackend;
pub use rate_limiter::{DualWindowRateLimiter, RateLimiterStats};

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::{GuardError, Result};

/// Options for a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2048,
        }
    }
}

impl GenerateOptions {
    /// Derive call options from the provider configuration.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A swappable external text-generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync + std::fmt::Debug {
    /// Short identifier for logs and stats (e.g. `"cerebras"`).
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

/// Select and construct the configured concrete backend.
pub fn backend_from_config(config: &ProviderConfig) -> Result<Box<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "cerebras" => Ok(Box::new(CerebrasBackend::from_config(config)?)),
        other => Err(GuardError::Config(format!(
            "unknown generation provider: {other:?}"
        ))),
    }
}

/// Map an HTTP error status + body from a provider API onto a crate error.
///
/// Quota-style failures (429, or a body that mentions quota / rate limits)
/// become [`GuardError::RateLimited`] so callers can distinguish them from
/// hard provider failures.
pub(crate) fn parse_provider_error(status: u16, body: &str) -> GuardError {
    let lowered = body.to_lowercase();
    if status == 429 || lowered.contains("quota") || lowered.contains("rate limit") {
        GuardError::RateLimited(format!("provider reported quota exhaustion: {body}"))
    } else {
        GuardError::Provider(format!("HTTP {status}: {body}"))
    }
}
