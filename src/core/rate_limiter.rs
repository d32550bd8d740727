//! Fixed-window rate limiting backed by the cache layer
//!
//! Window records live in the shared store so limits hold across processes
//! that share it. When the store cannot be read or written the limiter fails
//! open: availability of messaging wins over strict enforcement.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheLayer, CacheTtl, StoreResult};
use crate::config::RateLimitConfig;
use crate::core::clock::SharedClock;
use crate::core::key_lock::KeyedLocks;

/// Stored counter for one identifier's current window
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateWindow {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Outcome of a single rate limit check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct RateLimiter {
    cache: Arc<CacheLayer>,
    clock: SharedClock,
    locks: KeyedLocks,
    defaults: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<CacheLayer>, clock: SharedClock, defaults: RateLimitConfig) -> Self {
        Self {
            cache,
            clock,
            locks: KeyedLocks::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &RateLimitConfig {
        &self.defaults
    }

    fn window_key(identifier: &str) -> String {
        format!("ratelimit:{}", identifier)
    }

    fn window_end(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
        now + ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::zero())
    }

    /// Count one event for `identifier` and decide whether it is allowed.
    ///
    /// The first event of a window opens it; the count resets once `window`
    /// has elapsed since then. A limit of zero denies everything.
    pub async fn check_rate_limit(&self, identifier: &str, limit: u32, window: Duration) -> RateLimitDecision {
        let now = self.clock.now();

        if limit == 0 {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: Self::window_end(now, window),
            };
        }

        let key = Self::window_key(identifier);
        let _guard = self.locks.lock(&key).await;

        match self.count_event(&key, now, limit, window).await {
            Ok(decision) => {
                if !decision.allowed {
                    log::debug!("Rate limit exceeded for {} (limit {})", identifier, limit);
                }
                decision
            }
            Err(e) => {
                log::warn!("Rate limit store unavailable for {}, allowing: {}", identifier, e);
                RateLimitDecision {
                    allowed: true,
                    remaining: limit,
                    reset_at: Self::window_end(now, window),
                }
            }
        }
    }

    /// Check against the configured default limit and window
    pub async fn check_default(&self, identifier: &str) -> RateLimitDecision {
        self.check_rate_limit(identifier, self.defaults.default_limit, self.defaults.default_window)
            .await
    }

    /// Forget the current window for `identifier`
    pub async fn reset(&self, identifier: &str) {
        let key = Self::window_key(identifier);
        let _guard = self.locks.lock(&key).await;
        self.cache.delete(&key).await;
    }

    async fn count_event(
        &self,
        key: &str,
        now: DateTime<Utc>,
        limit: u32,
        window: Duration,
    ) -> StoreResult<RateLimitDecision> {
        let current = self
            .cache
            .try_get::<RateWindow>(key)
            .await?
            .filter(|w| w.reset_at > now);

        let Some(mut record) = current else {
            let record = RateWindow {
                count: 1,
                reset_at: Self::window_end(now, window),
            };
            self.cache.try_set(key, &record, Some(CacheTtl::Custom(window))).await?;
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: limit - 1,
                reset_at: record.reset_at,
            });
        };

        if record.count >= limit {
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: record.reset_at,
            });
        }

        record.count += 1;
        let ttl = (record.reset_at - now).to_std().unwrap_or(window);
        self.cache.try_set(key, &record, Some(CacheTtl::Custom(ttl))).await?;

        Ok(RateLimitDecision {
            allowed: true,
            remaining: limit - record.count,
            reset_at: record.reset_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, TtlPolicy};
    use crate::core::clock::ManualClock;

    fn limiter_with_clock() -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new();
        let store = Arc::new(MemoryStore::with_clock(100, Arc::new(clock.clone())));
        let cache = Arc::new(CacheLayer::new(store, TtlPolicy::default(), "test:"));
        let limiter = RateLimiter::new(cache, Arc::new(clock.clone()), RateLimitConfig::default());
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_window_counts_down_then_denies() {
        let (limiter, _clock) = limiter_with_clock();
        let window = Duration::from_secs(60);

        let mut allowed = Vec::new();
        let mut remaining = Vec::new();
        for _ in 0..4 {
            let d = limiter.check_rate_limit("user-1", 3, window).await;
            allowed.push(d.allowed);
            remaining.push(d.remaining);
        }

        assert_eq!(allowed, vec![true, true, true, false]);
        assert_eq!(remaining, vec![2, 1, 0, 0]);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let (limiter, clock) = limiter_with_clock();
        let window = Duration::from_secs(60);

        for _ in 0..4 {
            limiter.check_rate_limit("user-1", 3, window).await;
        }
        clock.advance(Duration::from_secs(61));

        let d = limiter.check_rate_limit("user-1", 3, window).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 2);
    }

    #[tokio::test]
    async fn test_reset_at_is_stable_within_window() {
        let (limiter, clock) = limiter_with_clock();
        let window = Duration::from_secs(10);

        let first = limiter.check_rate_limit("k", 5, window).await;
        clock.advance(Duration::from_secs(4));
        let second = limiter.check_rate_limit("k", 5, window).await;
        assert_eq!(first.reset_at, second.reset_at);
    }

    #[tokio::test]
    async fn test_zero_limit_always_denies() {
        let (limiter, _clock) = limiter_with_clock();
        let d = limiter.check_rate_limit("k", 0, Duration::from_secs(1)).await;
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let (limiter, _clock) = limiter_with_clock();
        let window = Duration::from_secs(60);
        assert!(limiter.check_rate_limit("a", 1, window).await.allowed);
        assert!(!limiter.check_rate_limit("a", 1, window).await.allowed);
        assert!(limiter.check_rate_limit("b", 1, window).await.allowed);

        limiter.reset("a").await;
        assert!(limiter.check_rate_limit("a", 1, window).await.allowed);
    }
}
