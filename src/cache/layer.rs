//! Semantic cache operations on top of a [`KeyValueStore`]
//!
//! Reads and writes that fail at the store level are logged and reported as a
//! miss (`None`) or a no-op; the `try_*` variants surface the [`StoreError`](super::StoreError)
//! for callers that must distinguish an outage from a miss, such as the rate
//! limiter's fail-open path.

use futures_util::future::{join_all, BoxFuture};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::keys::{escape_glob, namespace_pattern, namespaced_key};
use super::store::{KeyValueStore, StoreBackend, StoreResult};
pub use crate::config::TtlPolicy;

/// Named expiration tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    Short,
    Medium,
    Long,
    Daily,
    Weekly,
    Custom(Duration),
}

impl TtlPolicy {
    pub fn resolve(&self, ttl: CacheTtl) -> Duration {
        match ttl {
            CacheTtl::Short => self.short,
            CacheTtl::Medium => self.medium,
            CacheTtl::Long => self.long,
            CacheTtl::Daily => self.daily,
            CacheTtl::Weekly => self.weekly,
            CacheTtl::Custom(d) => d,
        }
    }
}

/// One computation to run during cache warming
pub struct WarmEntry {
    pub key: String,
    pub ttl: Option<CacheTtl>,
    pub compute: BoxFuture<'static, Result<serde_json::Value, String>>,
}

impl WarmEntry {
    pub fn new<F>(key: impl Into<String>, ttl: Option<CacheTtl>, compute: F) -> Self
    where
        F: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
    {
        Self {
            key: key.into(),
            ttl,
            compute: Box::pin(compute),
        }
    }
}

/// Outcome of [`CacheLayer::warm_cache`]
#[derive(Debug, Default, Clone, Serialize)]
pub struct WarmReport {
    pub warmed: Vec<String>,
    /// (key, reason) for every entry whose computation or write failed
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub connected: bool,
    pub backend: StoreBackend,
    /// Approximate number of keys under this process's namespace
    pub key_count: Option<u64>,
    pub memory_usage: Option<String>,
}

/// Ranked entry in a cached leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub member: String,
    pub score: f64,
}

fn user_namespace(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub struct CacheLayer {
    store: Arc<dyn KeyValueStore>,
    ttl: TtlPolicy,
    prefix: String,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: TtlPolicy, prefix: impl Into<String>) -> Self {
        Self {
            store,
            ttl,
            prefix: prefix.into(),
        }
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    pub fn backend(&self) -> StoreBackend {
        self.store.backend()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn resolve(&self, ttl: Option<CacheTtl>) -> Duration {
        self.ttl.resolve(ttl.unwrap_or(CacheTtl::Medium))
    }

    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(&self.full_key(key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<CacheTtl>,
    ) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(&self.full_key(key), raw, self.resolve(ttl)).await
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Cache get for {} treated as miss: {}", key, e);
                None
            }
        }
    }

    /// Store a value; `None` ttl means the medium tier
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<CacheTtl>) -> bool {
        match self.try_set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cache set for {} dropped: {}", key, e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> u64 {
        self.store.delete(&self.full_key(key)).await.unwrap_or_else(|e| {
            log::warn!("Cache delete for {} failed: {}", key, e);
            0
        })
    }

    /// Delete every key matching a glob; the configured prefix is matched literally
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        let full_pattern = format!("{}{}", escape_glob(&self.prefix), pattern);
        self.store
            .delete_by_pattern(&full_pattern)
            .await
            .unwrap_or_else(|e| {
                log::warn!("Cache pattern delete for {} failed: {}", pattern, e);
                0
            })
    }

    pub async fn flush(&self) -> bool {
        match self.store.flush_all().await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cache flush failed: {}", e);
                false
            }
        }
    }

    /// Return the cached value, or compute, store and return it.
    ///
    /// Racing callers on a cold key may each run `compute`; the last write
    /// wins. A failed computation is returned and nothing is stored.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: Option<CacheTtl>, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            log::trace!("Cache hit for {}", key);
            return Ok(hit);
        }

        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Key for per-user cached data: `user:<id>:<hash(params)>`
    pub fn user_cache_key<P: Serialize + ?Sized>(user_id: &str, params: &P) -> StoreResult<String> {
        namespaced_key(&user_namespace(user_id), params)
    }

    pub async fn get_user_cache<T, P>(&self, user_id: &str, params: &P) -> Option<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        match Self::user_cache_key(user_id, params) {
            Ok(key) => self.get(&key).await,
            Err(e) => {
                log::warn!("Could not build user cache key for {}: {}", user_id, e);
                None
            }
        }
    }

    pub async fn set_user_cache<T, P>(&self, user_id: &str, params: &P, value: &T, ttl: Option<CacheTtl>) -> bool
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        match Self::user_cache_key(user_id, params) {
            Ok(key) => self.set(&key, value, ttl).await,
            Err(e) => {
                log::warn!("Could not build user cache key for {}: {}", user_id, e);
                false
            }
        }
    }

    /// Drop every cached entry of one user
    pub async fn invalidate_user_cache(&self, user_id: &str) -> u64 {
        self.delete_by_pattern(&namespace_pattern(&user_namespace(user_id)))
            .await
    }

    pub async fn set_session<T: Serialize + ?Sized>(&self, session_id: &str, data: &T) -> bool {
        self.set(&format!("session:{}", session_id), data, Some(CacheTtl::Daily))
            .await
    }

    pub async fn get_session<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        self.get(&format!("session:{}", session_id)).await
    }

    pub async fn delete_session(&self, session_id: &str) -> u64 {
        self.delete(&format!("session:{}", session_id)).await
    }

    /// Cache a ranked leaderboard, highest score first
    pub async fn set_leaderboard(&self, name: &str, mut entries: Vec<LeaderboardEntry>) -> bool {
        entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        self.set(&format!("leaderboard:{}", name), &entries, Some(CacheTtl::Short))
            .await
    }

    pub async fn get_leaderboard(&self, name: &str) -> Option<Vec<LeaderboardEntry>> {
        self.get(&format!("leaderboard:{}", name)).await
    }

    /// Read-modify-write increment.
    ///
    /// Not atomic: concurrent callers can lose increments. Suitable for
    /// approximate analytics only.
    pub async fn increment_counter(&self, key: &str, ttl: Option<CacheTtl>) -> u64 {
        let current: u64 = self.get(key).await.unwrap_or(0);
        let next = current + 1;
        self.set(key, &next, ttl).await;
        next
    }

    /// Run every computation concurrently and store each success on its own.
    /// Failures are collected, never raised.
    pub async fn warm_cache(&self, entries: Vec<WarmEntry>) -> WarmReport {
        let tasks = entries.into_iter().map(|entry| async move {
            let WarmEntry { key, ttl, compute } = entry;
            let outcome = match compute.await {
                Ok(value) => self.try_set(&key, &value, ttl).await.map_err(|e| e.to_string()),
                Err(reason) => Err(reason),
            };
            (key, outcome)
        });

        let mut report = WarmReport::default();
        for (key, outcome) in join_all(tasks).await {
            match outcome {
                Ok(()) => report.warmed.push(key),
                Err(reason) => {
                    log::warn!("Cache warming failed for {}: {}", key, reason);
                    report.failed.push((key, reason));
                }
            }
        }

        log::info!(
            "Cache warming finished: {} warmed, {} failed",
            report.warmed.len(),
            report.failed.len()
        );
        report
    }

    /// Connectivity and size report; degrades to `connected: false` instead of failing
    pub async fn get_stats(&self) -> CacheStats {
        let backend = self.store.backend();

        if let Err(e) = self.store.ping().await {
            log::warn!("Cache stats unavailable: {}", e);
            return CacheStats {
                connected: false,
                backend,
                key_count: None,
                memory_usage: None,
            };
        }

        let key_count = self.store.count_keys(&self.full_key("*")).await.ok();
        let memory_usage = self.store.memory_usage().await.unwrap_or(None);

        CacheStats {
            connected: true,
            backend,
            key_count,
            memory_usage,
        }
    }
}
