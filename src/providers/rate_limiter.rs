//! Dual-window admission control for the generation API.
//!
//! Fixed-window counters with independent per-minute and per-day budgets.
//! Each window holds a remaining-token count and the instant its current
//! window began; once a window's duration has fully elapsed the count
//! snaps back to the configured limit. Fixed windows permit up to ~2x the
//! nominal limit across a window boundary — that trade is intentional and
//! must be preserved; do not replace this with sliding-window or
//! leaky-bucket accounting without revisiting every caller's throughput
//! expectations.
//!
//! One mutex guards both windows, so a request is only ever admitted when
//! both have tokens, and both are decremented together or not at all.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

/// Duration of the short window.
const MINUTE_WINDOW: Duration = Duration::from_secs(60);
/// Duration of the long window.
const DAY_WINDOW: Duration = Duration::from_secs(86_400);
/// Sleep increment between blocking-acquire retries.
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct LimiterState {
    minute_tokens: u32,
    minute_window_start: Instant,
    day_tokens: u32,
    day_window_start: Instant,
    total_requests: u64,
    total_blocked: u64,
}

impl LimiterState {
    fn fresh(rpm_limit: u32, rpd_limit: u32) -> Self {
        let now = Instant::now();
        Self {
            minute_tokens: rpm_limit,
            minute_window_start: now,
            day_tokens: rpd_limit,
            day_window_start: now,
            total_requests: 0,
            total_blocked: 0,
        }
    }
}

/// Thread-safe fixed-window rate limiter with per-minute and per-day
/// quotas. Created once at startup by the composition root and shared by
/// reference; denial is always communicated as `false`, never an error.
#[derive(Debug)]
pub struct DualWindowRateLimiter {
    rpm_limit: u32,
    rpd_limit: u32,
    state: Mutex<LimiterState>,
}

impl DualWindowRateLimiter {
    /// Create a limiter with both windows at full capacity.
    pub fn new(requests_per_minute: u32, requests_per_day: u32) -> Self {
        info!(
            rpm = requests_per_minute,
            rpd = requests_per_day,
            "initialized rate limiter"
        );
        Self {
            rpm_limit: requests_per_minute,
            rpd_limit: requests_per_day,
            state: Mutex::new(LimiterState::fresh(requests_per_minute, requests_per_day)),
        }
    }

    /// Snap a window back to full capacity once its duration has elapsed.
    fn refresh_windows(&self, state: &mut LimiterState) {
        let now = Instant::now();
        if now.duration_since(state.minute_window_start) >= MINUTE_WINDOW {
            state.minute_tokens = self.rpm_limit;
            state.minute_window_start = now;
            debug!(tokens = state.minute_tokens, "minute window reset");
        }
        if now.duration_since(state.day_window_start) >= DAY_WINDOW {
            state.day_tokens = self.rpd_limit;
            state.day_window_start = now;
            debug!(tokens = state.day_tokens, "day window reset");
        }
    }

    /// One atomic admission attempt: refresh both windows, then admit only
    /// if both have tokens, decrementing both together.
    fn admit(&self) -> bool {
        let mut state = self.state.lock().expect("limiter lock poisoned");
        self.refresh_windows(&mut state);

        if state.minute_tokens > 0 && state.day_tokens > 0 {
            state.minute_tokens -= 1;
            state.day_tokens -= 1;
            state.total_requests += 1;
            debug!(
                minute = state.minute_tokens,
                minute_limit = self.rpm_limit,
                day = state.day_tokens,
                day_limit = self.rpd_limit,
                "request admitted"
            );
            true
        } else {
            state.total_blocked += 1;
            let limit_type = if state.minute_tokens == 0 { "minute" } else { "day" };
            warn!(
                limit_type,
                minute = state.minute_tokens,
                minute_limit = self.rpm_limit,
                day = state.day_tokens,
                day_limit = self.rpd_limit,
                "rate limit exceeded"
            );
            false
        }
    }

    /// Non-blocking admission attempt. `true` means the caller may issue
    /// one request against the external API.
    pub fn try_acquire(&self) -> bool {
        self.admit()
    }

    /// Blocking admission attempt: retry in one-second increments until
    /// admitted or until the elapsed wait reaches `timeout`. `None` waits
    /// indefinitely. The lock is released between attempts, so a waiting
    /// caller never starves others; the timeout is the only cancellation
    /// mechanism. Every denied attempt counts toward `total_blocked`.
    pub fn acquire_blocking(&self, timeout: Option<Duration>) -> bool {
        let start = Instant::now();
        loop {
            if self.admit() {
                return true;
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    warn!(timeout_secs = limit.as_secs_f64(), "rate limiter timeout");
                    return false;
                }
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Estimated time until the next request could be admitted. Zero when
    /// both windows currently have tokens. When both are exhausted the
    /// minute window is reported, which is always the shorter-or-equal
    /// estimate.
    pub fn wait_time(&self) -> Duration {
        let mut state = self.state.lock().expect("limiter lock poisoned");
        self.refresh_windows(&mut state);
        Self::wait_time_locked(&state)
    }

    fn wait_time_locked(state: &LimiterState) -> Duration {
        if state.minute_tokens > 0 && state.day_tokens > 0 {
            return Duration::ZERO;
        }
        if state.minute_tokens == 0 {
            MINUTE_WINDOW.saturating_sub(state.minute_window_start.elapsed())
        } else {
            DAY_WINDOW.saturating_sub(state.day_window_start.elapsed())
        }
    }

    /// Point-in-time limiter statistics for the observability surface.
    pub fn stats(&self) -> RateLimiterStats {
        let mut state = self.state.lock().expect("limiter lock poisoned");
        self.refresh_windows(&mut state);
        RateLimiterStats {
            total_requests: state.total_requests,
            total_blocked: state.total_blocked,
            minute_tokens_remaining: state.minute_tokens,
            minute_limit: self.rpm_limit,
            day_tokens_remaining: state.day_tokens,
            day_limit: self.rpd_limit,
            estimated_wait_seconds: Self::wait_time_locked(&state).as_secs_f64(),
        }
    }

    /// Restore both windows to full capacity starting now and zero the
    /// request/blocked counters.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("limiter lock poisoned");
        *state = LimiterState::fresh(self.rpm_limit, self.rpd_limit);
        info!("rate limiter reset");
    }

    #[cfg(test)]
    fn backdate_minute_window(&self, age: Duration) {
        let mut state = self.state.lock().unwrap();
        state.minute_window_start -= age;
    }

    #[cfg(test)]
    fn backdate_day_window(&self, age: Duration) {
        let mut state = self.state.lock().unwrap();
        state.day_window_start -= age;
    }

    #[cfg(test)]
    fn drain_day_tokens(&self) {
        let mut state = self.state.lock().unwrap();
        state.day_tokens = 0;
    }
}

/// Aggregate limiter statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterStats {
    /// Requests admitted since construction or the last reset.
    pub total_requests: u64,
    /// Denied admission attempts since construction or the last reset.
    pub total_blocked: u64,
    /// Tokens left in the current minute window.
    pub minute_tokens_remaining: u32,
    /// Configured per-minute budget.
    pub minute_limit: u32,
    /// Tokens left in the current day window.
    pub day_tokens_remaining: u32,
    /// Configured per-day budget.
    pub day_limit: u32,
    /// Estimated seconds until the next request could be admitted.
    pub estimated_wait_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_exact_admission() {
        let limiter = DualWindowRateLimiter::new(3, 10);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire(), "fourth request must be denied");

        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.total_blocked, 1);
        assert_eq!(stats.minute_tokens_remaining, 0);
        assert_eq!(stats.day_tokens_remaining, 7);
    }

    #[test]
    fn test_both_windows_decrement_together() {
        let limiter = DualWindowRateLimiter::new(5, 5);
        assert!(limiter.try_acquire());
        let stats = limiter.stats();
        assert_eq!(stats.minute_tokens_remaining, 4);
        assert_eq!(stats.day_tokens_remaining, 4);
    }

    #[test]
    fn test_day_exhaustion_denies_even_with_minute_tokens() {
        let limiter = DualWindowRateLimiter::new(10, 2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire(), "day budget spent");

        let stats = limiter.stats();
        assert_eq!(stats.minute_tokens_remaining, 8, "minute tokens untouched by denial");
        assert_eq!(stats.day_tokens_remaining, 0);
    }

    #[test]
    fn test_minute_window_reset_restores_admission() {
        let limiter = DualWindowRateLimiter::new(2, 100);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        limiter.backdate_minute_window(Duration::from_secs(61));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire(), "only the configured limit after reset");
    }

    #[test]
    fn test_day_window_reset_restores_admission() {
        let limiter = DualWindowRateLimiter::new(100, 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        limiter.backdate_day_window(Duration::from_secs(86_401));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_wait_time_zero_when_tokens_available() {
        let limiter = DualWindowRateLimiter::new(5, 5);
        assert_eq!(limiter.wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_wait_time_positive_when_minute_exhausted() {
        let limiter = DualWindowRateLimiter::new(1, 100);
        assert!(limiter.try_acquire());

        let wait = limiter.wait_time();
        assert!(wait > Duration::ZERO);
        assert!(wait <= MINUTE_WINDOW);
    }

    #[test]
    fn test_wait_time_zero_after_window_elapsed() {
        let limiter = DualWindowRateLimiter::new(1, 100);
        assert!(limiter.try_acquire());
        limiter.backdate_minute_window(Duration::from_secs(61));
        // The elapsed window is refreshed before the estimate is computed.
        assert_eq!(limiter.wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_wait_time_reports_day_window_when_only_day_exhausted() {
        let limiter = DualWindowRateLimiter::new(5, 5);
        limiter.drain_day_tokens();

        let wait = limiter.wait_time();
        // Day window just started, so nearly the full day remains.
        assert!(wait > MINUTE_WINDOW);
        assert!(wait <= DAY_WINDOW);
    }

    #[test]
    fn test_simultaneous_exhaustion_reports_minute_wait() {
        let limiter = DualWindowRateLimiter::new(1, 1);
        assert!(limiter.try_acquire());

        let wait = limiter.wait_time();
        assert!(wait <= MINUTE_WINDOW, "minute window is checked first");
    }

    #[test]
    fn test_reset_restores_capacity_and_zeroes_counters() {
        let limiter = DualWindowRateLimiter::new(2, 2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        limiter.reset();
        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.total_blocked, 0);
        assert_eq!(stats.minute_tokens_remaining, 2);
        assert_eq!(stats.day_tokens_remaining, 2);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_blocking_acquire_zero_timeout_denies_immediately() {
        let limiter = DualWindowRateLimiter::new(1, 1);
        assert!(limiter.try_acquire());

        let start = Instant::now();
        let granted = limiter.acquire_blocking(Some(Duration::ZERO));
        assert!(!granted);
        assert!(start.elapsed() < Duration::from_millis(500), "no retry sleep on zero timeout");
        assert_eq!(limiter.stats().total_blocked, 1);
    }

    #[test]
    fn test_blocking_acquire_succeeds_when_tokens_available() {
        let limiter = DualWindowRateLimiter::new(1, 1);
        assert!(limiter.acquire_blocking(Some(Duration::from_secs(5))));
        assert_eq!(limiter.stats().total_requests, 1);
    }

    #[test]
    fn test_blocking_acquire_grants_after_reset_from_another_thread() {
        let limiter = Arc::new(DualWindowRateLimiter::new(1, 100));
        assert!(limiter.try_acquire());

        let waiter = {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || limiter.acquire_blocking(Some(Duration::from_secs(10))))
        };
        // Give the waiter time to enter its retry loop, then free capacity.
        std::thread::sleep(Duration::from_millis(100));
        limiter.reset();

        assert!(waiter.join().unwrap(), "waiter should be admitted after reset");
    }

    #[test]
    fn test_no_over_admission_under_concurrency() {
        let limiter = Arc::new(DualWindowRateLimiter::new(50, 50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..25).filter(|_| limiter.try_acquire()).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 50, "exactly the configured budget is admitted");
        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 50);
        assert_eq!(stats.total_blocked, 150);
    }

    #[test]
    fn test_stats_estimated_wait_matches_state() {
        let limiter = DualWindowRateLimiter::new(1, 100);
        assert_eq!(limiter.stats().estimated_wait_seconds, 0.0);
        assert!(limiter.try_acquire());
        assert!(limiter.stats().estimated_wait_seconds > 0.0);
    }
}
