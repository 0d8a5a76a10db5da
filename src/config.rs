//! Construction-time configuration for the QueryGuard core.
//!
//! All three components are configured once at startup by the embedding
//! service's composition root; nothing here is hot-reloadable. Values load
//! from a TOML file and/or environment variables (`.env` supported via
//! dotenvy), with env taking precedence over file contents.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Default cache entry time-to-live in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
/// Default per-minute request budget.
pub const DEFAULT_RPM_LIMIT: u32 = 60;
/// Default per-day request budget.
pub const DEFAULT_RPD_LIMIT: u32 = 10_000;
/// Default blocking-acquire timeout in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 60;

/// Response cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether generation responses are cached at all.
    pub enabled: bool,
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// Dual-window rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests admitted per minute window.
    pub requests_per_minute: u32,
    /// Maximum requests admitted per day window.
    pub requests_per_day: u32,
    /// How long a guarded generation call waits for admission before
    /// giving up. `0` disables waiting (deny immediately when exhausted).
    pub acquire_timeout_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_RPM_LIMIT,
            requests_per_day: DEFAULT_RPD_LIMIT,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

/// Generation backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend name; currently `"cerebras"` is the only built-in.
    pub provider: String,
    /// Model identifier; `None` uses the backend's default.
    pub model: Option<String>,
    /// API key. Falls back to the backend's environment variable
    /// (`CEREBRAS_API_KEY`) when unset.
    pub api_key: Option<String>,
    /// Sampling temperature for generation calls.
    pub temperature: f32,
    /// Completion token cap for generation calls.
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "cerebras".to_string(),
            model: None,
            api_key: None,
            temperature: 0.1,
            max_tokens: 2048,
        }
    }
}

/// Top-level configuration for the QueryGuard core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub provider: ProviderConfig,
}

impl GuardConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let mut config: GuardConfig = toml::from_str(&data)
            .map_err(|e| GuardError::Config(format!("invalid config file: {e}")))?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Build a configuration from defaults plus env overrides only.
    pub fn from_env() -> Result<Self> {
        let mut config = GuardConfig::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Recognised variables: `CACHE_TTL_SECONDS`, `CEREBRAS_RPM_LIMIT`,
    /// `CEREBRAS_RPD_LIMIT`, `CEREBRAS_MODEL`, `CEREBRAS_API_KEY`.
    /// A variable that is set but unparseable is a configuration error.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Best-effort .env loading; a missing file is not an error.
        let _ = dotenvy::dotenv();

        if let Some(ttl) = parse_env::<u64>("CACHE_TTL_SECONDS")? {
            self.cache.ttl_secs = ttl;
        }
        if let Some(rpm) = parse_env::<u32>("CEREBRAS_RPM_LIMIT")? {
            self.rate_limit.requests_per_minute = rpm;
        }
        if let Some(rpd) = parse_env::<u32>("CEREBRAS_RPD_LIMIT")? {
            self.rate_limit.requests_per_day = rpd;
        }
        if let Ok(model) = std::env::var("CEREBRAS_MODEL") {
            if !model.is_empty() {
                self.provider.model = Some(model);
            }
        }
        if let Ok(key) = std::env::var("CEREBRAS_API_KEY") {
            if !key.is_empty() {
                self.provider.api_key = Some(key);
            }
        }
        Ok(())
    }
}

/// Read and parse an env var. Unset returns `Ok(None)`; set-but-invalid is
/// a `Config` error naming the variable.
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| GuardError::Config(format!("invalid value for {name}: {raw:?}"))),
        _ => Ok(None),
    }
}
