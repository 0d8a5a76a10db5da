//! Error types for QueryGuard.
//!
//! Expected negative outcomes — cache misses, rate-limiter denials,
//! validator rejections — are plain return values, never errors. The
//! variants here cover configuration failures and generation backend
//! transport failures only.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors surfaced by QueryGuard components.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Invalid or missing configuration (bad env value, unknown provider).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation backend failed (transport, malformed response,
    /// retries exhausted).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Admission was denied and the blocking wait timed out, or the remote
    /// API itself reported a quota violation. The message carries the
    /// estimated wait so callers can surface a "try again later" hint.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// HTTP client error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
