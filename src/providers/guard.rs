//! Admission-controlled generation.
//!
//! [`GuardedBackend`] wraps an inner [`GenerationBackend`] with the
//! response cache and the dual-window rate limiter: look up the cache
//! first; on a miss, wait for limiter admission before invoking the inner
//! backend; cache only successful responses. A cache hit never consults
//! the limiter — it costs no quota.
//!
//! Built by the service's composition root at startup (no global
//! instances); the cache and limiter are shared via `Arc` so monitoring
//! endpoints can read their stats through the same handles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ResponseCache};
use crate::config::GuardConfig;
use crate::error::{GuardError, Result};

use super::rate_limiter::{DualWindowRateLimiter, RateLimiterStats};
use super::{backend_from_config, GenerateOptions, GenerationBackend};

/// Decorator that gates an inner backend behind the response cache and
/// the dual-window rate limiter.
#[derive(Debug)]
pub struct GuardedBackend {
    inner: Box<dyn GenerationBackend>,
    cache: Arc<ResponseCache>,
    limiter: Arc<DualWindowRateLimiter>,
    acquire_timeout: Option<Duration>,
    cache_enabled: bool,
}

impl GuardedBackend {
    /// Wrap `inner` with an explicit cache and limiter.
    ///
    /// `acquire_timeout` bounds the blocking wait for admission; `None`
    /// waits indefinitely.
    pub fn new(
        inner: Box<dyn GenerationBackend>,
        cache: Arc<ResponseCache>,
        limiter: Arc<DualWindowRateLimiter>,
        acquire_timeout: Option<Duration>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            inner,
            cache,
            limiter,
            acquire_timeout,
            cache_enabled,
        }
    }

    /// Construct the full stack — configured concrete backend, cache, and
    /// limiter — from configuration.
    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        let inner = backend_from_config(&config.provider)?;
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(config.cache.ttl_secs)));
        let limiter = Arc::new(DualWindowRateLimiter::new(
            config.rate_limit.requests_per_minute,
            config.rate_limit.requests_per_day,
        ));
        info!(provider = inner.name(), "initialized guarded backend");
        Ok(Self::new(
            inner,
            cache,
            limiter,
            Some(Duration::from_secs(config.rate_limit.acquire_timeout_secs)),
            config.cache.enabled,
        ))
    }

    /// Shared handle to the response cache.
    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }

    /// Shared handle to the rate limiter.
    pub fn limiter(&self) -> Arc<DualWindowRateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Cache statistics for the observability surface.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Limiter statistics for the observability surface.
    pub fn limiter_stats(&self) -> RateLimiterStats {
        self.limiter.stats()
    }

    /// Wait for limiter admission without stalling the async runtime.
    ///
    /// The limiter's blocking acquire sleeps the calling thread, so it
    /// runs on the blocking pool.
    async fn acquire_admission(&self) -> Result<bool> {
        let limiter = Arc::clone(&self.limiter);
        let timeout = self.acquire_timeout;
        tokio::task::spawn_blocking(move || limiter.acquire_blocking(timeout))
            .await
            .map_err(|e| GuardError::Provider(format!("admission task failed: {e}")))
    }
}

#[async_trait]
impl GenerationBackend for GuardedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        if self.cache_enabled {
            if let Some(cached) = self.cache.get(prompt) {
                debug!("returning cached response");
                return Ok(cached);
            }
        }

        if !self.acquire_admission().await? {
            let wait = self.limiter.wait_time();
            let stats = self.limiter.stats();
            warn!(
                wait_secs = wait.as_secs_f64(),
                "admission denied after blocking wait"
            );
            return Err(GuardError::RateLimited(format!(
                "request budget exhausted; retry in {:.0}s (limits: {}/min, {}/day)",
                wait.as_secs_f64(),
                stats.minute_limit,
                stats.day_limit,
            )));
        }

        let response = self.inner.generate(prompt, options).await?;

        if self.cache_enabled {
            self.cache.set(prompt, &response);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and returns a canned response. The counter is
    /// shared so tests can read it after the backend moves into the guard.
    #[derive(Debug)]
    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        response: String,
    }

    impl CountingBackend {
        fn new(response: &str) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                response: response.to_string(),
            }
        }

        fn counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl GenerationBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    /// Always fails with a provider error.
    #[derive(Debug)]
    struct FailingBackend;

    #[async_trait]
    impl GenerationBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
            Err(GuardError::Provider("backend down".to_string()))
        }
    }

    fn guarded(
        inner: Box<dyn GenerationBackend>,
        rpm: u32,
        rpd: u32,
        cache_enabled: bool,
    ) -> GuardedBackend {
        GuardedBackend::new(
            inner,
            Arc::new(ResponseCache::new(Duration::from_secs(3600))),
            Arc::new(DualWindowRateLimiter::new(rpm, rpd)),
            Some(Duration::ZERO),
            cache_enabled,
        )
    }

    #[tokio::test]
    async fn test_end_to_end_admission_pipeline() {
        let inner = CountingBackend::new("SELECT * FROM customers");
        let calls = inner.counter();
        let backend = guarded(Box::new(inner), 10, 100, true);

        // First call: miss -> admitted -> generated -> cached.
        let first = backend
            .generate("How many customers?", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(first, "SELECT * FROM customers");
        assert_eq!(backend.limiter_stats().total_requests, 1);
        assert_eq!(backend.cache_stats().misses, 1);
        assert_eq!(backend.cache_stats().size, 1);

        // Second identical call: cache hit; limiter untouched, backend not
        // invoked again.
        let second = backend
            .generate("How many customers?", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(backend.limiter_stats().total_requests, 1);
        assert_eq!(backend.cache_stats().hits, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "generation invoked exactly once");
    }

    #[tokio::test]
    async fn test_denial_surfaces_rate_limited_error() {
        let backend = guarded(Box::new(CountingBackend::new("resp")), 1, 1, true);

        backend
            .generate("first", &GenerateOptions::default())
            .await
            .unwrap();
        let denied = backend.generate("second", &GenerateOptions::default()).await;

        match denied {
            Err(GuardError::RateLimited(msg)) => {
                assert!(msg.contains("1/min"), "message carries limits: {msg}");
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(backend.limiter_stats().total_blocked, 1);
    }

    #[tokio::test]
    async fn test_failed_generation_is_not_cached() {
        let backend = guarded(Box::new(FailingBackend), 10, 10, true);

        let result = backend.generate("prompt", &GenerateOptions::default()).await;
        assert!(matches!(result, Err(GuardError::Provider(_))));
        assert_eq!(backend.cache_stats().size, 0, "failure must not be cached");
        // The admission token is still spent — the API call was attempted.
        assert_eq!(backend.limiter_stats().total_requests, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_generates() {
        let backend = guarded(Box::new(CountingBackend::new("resp")), 10, 10, false);

        backend.generate("p", &GenerateOptions::default()).await.unwrap();
        backend.generate("p", &GenerateOptions::default()).await.unwrap();

        assert_eq!(backend.limiter_stats().total_requests, 2);
        assert_eq!(backend.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_exhausted_limiter() {
        let backend = guarded(Box::new(CountingBackend::new("resp")), 1, 1, true);

        backend.generate("p", &GenerateOptions::default()).await.unwrap();
        // Budget is now exhausted, but the cached prompt still answers.
        let hit = backend.generate("p", &GenerateOptions::default()).await.unwrap();
        assert_eq!(hit, "resp");
        assert_eq!(backend.limiter_stats().total_blocked, 0);
    }

    #[test]
    fn test_name_delegates_to_inner() {
        let backend = guarded(Box::new(CountingBackend::new("r")), 1, 1, true);
        assert_eq!(backend.name(), "counting");
    }
}
