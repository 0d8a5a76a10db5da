//! LLM response caching with TTL expiry.

pub mod response_cache;

pub use response_cache::{CacheStats, ResponseCache};
