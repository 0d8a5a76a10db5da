//! QueryGuard — admission-control core for an NL-to-SQL service.
//!
//! Three cooperating components sit between the orchestration layer and
//! its two scarce resources:
//!
//! - [`ResponseCache`] — TTL-expiring cache of LLM responses, keyed by a
//!   SHA-256 fingerprint of the prompt.
//! - [`DualWindowRateLimiter`] — fixed-window admission control enforcing
//!   independent per-minute and per-day request budgets.
//! - [`SqlSafetyValidator`] — staged gate that accepts or rejects a
//!   candidate SQL statement before it may reach the database.
//!
//! [`GuardedBackend`] composes the first two around a swappable
//! [`GenerationBackend`]: cache lookup, then limiter admission, then the
//! external call, then cache fill. All components are constructed
//! explicitly by the embedding service's composition root — there are no
//! global instances — and all are safe under arbitrary concurrent use.

pub mod cache;
pub mod config;
pub mod error;
pub mod providers;
pub mod validator;

pub use cache::{CacheStats, ResponseCache};
pub use config::{CacheConfig, GuardConfig, ProviderConfig, RateLimitConfig};
pub use error::{GuardError, Result};
pub use providers::{
    CerebrasBackend, DualWindowRateLimiter, GenerateOptions, GenerationBackend, GuardedBackend,
    RateLimiterStats,
};
pub use validator::{
    ColumnDescriptor, SchemaCatalog, SchemaProvider, SqlSafetyValidator, ValidationResult,
};
