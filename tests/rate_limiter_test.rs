mod common;

use std::sync::Arc;
use std::time::Duration;

use chat_relay::cache::{CacheLayer, TtlPolicy};
use chat_relay::config::RateLimitConfig;
use chat_relay::core::{system_clock, ManualClock, RateLimiter};
use common::{clocked_cache, memory_cache, FlakyStore};

#[tokio::test]
async fn test_fixed_window_sequence() {
    let clock = ManualClock::new();
    let limiter = RateLimiter::new(clocked_cache(&clock), Arc::new(clock.clone()), RateLimitConfig::default());
    let window = Duration::from_secs(60);

    let mut decisions = Vec::new();
    for _ in 0..4 {
        decisions.push(limiter.check_rate_limit("api:alice", 3, window).await);
    }
    let allowed: Vec<bool> = decisions.iter().map(|d| d.allowed).collect();
    let remaining: Vec<u32> = decisions.iter().map(|d| d.remaining).collect();
    assert_eq!(allowed, vec![true, true, true, false]);
    assert_eq!(remaining, vec![2, 1, 0, 0]);
    assert_eq!(decisions[3].reset_at, decisions[0].reset_at);

    clock.advance(Duration::from_secs(60));
    let fifth = limiter.check_rate_limit("api:alice", 3, window).await;
    assert!(fifth.allowed);
    assert_eq!(fifth.remaining, 2);
}

#[tokio::test]
async fn test_store_outage_fails_open() {
    let store = Arc::new(FlakyStore::online());
    let cache = Arc::new(CacheLayer::new(store.clone(), TtlPolicy::default(), "test:"));
    let limiter = RateLimiter::new(cache, system_clock(), RateLimitConfig::default());
    let window = Duration::from_secs(60);

    assert!(limiter.check_rate_limit("bob", 1, window).await.allowed);
    assert!(!limiter.check_rate_limit("bob", 1, window).await.allowed);

    store.set_offline(true);
    for _ in 0..5 {
        let decision = limiter.check_rate_limit("bob", 1, window).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    // Enforcement resumes once the store is back
    store.set_offline(false);
    assert!(!limiter.check_rate_limit("bob", 1, window).await.allowed);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_window() {
    let limiter = Arc::new(RateLimiter::new(
        memory_cache(),
        system_clock(),
        RateLimitConfig::default(),
    ));

    let tasks: Vec<_> = (0..40)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .check_rate_limit("burst", 10, Duration::from_secs(60))
                    .await
                    .allowed
            })
        })
        .collect();

    let mut allowed = 0;
    for task in tasks {
        if task.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}

#[tokio::test]
async fn test_default_limits_apply() {
    let config = RateLimitConfig {
        default_limit: 2,
        default_window: Duration::from_secs(30),
        ..RateLimitConfig::default()
    };
    let limiter = RateLimiter::new(memory_cache(), system_clock(), config);

    assert!(limiter.check_default("ip:10.0.0.1").await.allowed);
    assert!(limiter.check_default("ip:10.0.0.1").await.allowed);
    assert!(!limiter.check_default("ip:10.0.0.1").await.allowed);
}
