//! Per-user sliding-window rate limiting.
//!
//! Each user owns a queue of recent submission timestamps. Timestamps
//! that fall out of the trailing window are evicted lazily on the next
//! check. The whole map sits behind one lock, so first-sight insertion and
//! eviction can never race.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window limiter keyed by user id
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: Mutex<HashMap<i64, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// A limiter allowing `max_requests` per user per `window`.
    ///
    /// Either value being zero disables limiting.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that admits everything
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0 && !self.window.is_zero()
    }

    /// Record a submission for `user_id` if it fits in the window.
    ///
    /// Returns `false` (and records nothing) when the user is over the limit.
    pub async fn check_and_record(&self, user_id: i64) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let timestamps = windows.entry(user_id).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            debug!(user_id, recent = timestamps.len(), "Rate window full");
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Run `next` only if the user is within their limit.
    ///
    /// Returns `None` without polling `next` when the request is rejected.
    pub async fn guard<F, Fut>(&self, user_id: i64, next: F) -> Option<Fut::Output>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        if self.check_and_record(user_id).await {
            Some(next().await)
        } else {
            None
        }
    }

    /// Number of timestamps currently held for a user (stale ones included)
    pub async fn recorded(&self, user_id: i64) -> usize {
        self.windows
            .lock()
            .await
            .get(&user_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rejects_after_max_requests() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        assert!(limiter.check_and_record(7).await);
        assert!(limiter.check_and_record(7).await);
        assert!(limiter.check_and_record(7).await);
        assert!(!limiter.check_and_record(7).await);

        // Rejections are not recorded
        assert_eq!(limiter.recorded(7).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));

        assert!(limiter.check_and_record(1).await);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.check_and_record(1).await);
        assert!(!limiter.check_and_record(1).await);

        // First timestamp leaves the window, second is still inside it
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.check_and_record(1).await);
        assert!(!limiter.check_and_record(1).await);
        assert_eq!(limiter.recorded(1).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(30));

        assert!(limiter.check_and_record(1).await);
        assert!(!limiter.check_and_record(1).await);
        assert!(limiter.check_and_record(2).await);
    }

    #[tokio::test]
    async fn test_disabled_when_either_value_is_zero() {
        for limiter in [
            RateLimiter::new(0, Duration::from_secs(30)),
            RateLimiter::new(5, Duration::ZERO),
            RateLimiter::disabled(),
        ] {
            assert!(!limiter.is_enabled());
            for _ in 0..20 {
                assert!(limiter.check_and_record(1).await);
            }
            assert_eq!(limiter.recorded(1).await, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_skips_continuation_when_rejected() {
        let limiter = RateLimiter::new(1, Duration::from_secs(30));
        let mut calls = 0;

        assert_eq!(limiter.guard(1, || async { 42 }).await, Some(42));
        let rejected = limiter
            .guard(1, || {
                calls += 1;
                async {}
            })
            .await;

        assert!(rejected.is_none());
        assert_eq!(calls, 0);
    }
}
