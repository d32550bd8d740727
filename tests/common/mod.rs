// Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use chat_relay::auth::{Claims, TokenManager};
use chat_relay::cache::{
    CacheLayer, KeyValueStore, MemoryStore, StoreBackend, StoreError, StoreResult, TtlPolicy,
};
use chat_relay::config::RateLimitConfig;
use chat_relay::core::{Connection, ManualClock, ServerManager, ServerMessage};
use chat_relay::storage::MemoryMessageStore;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789-abcdef";

/// Store that fails every call while `offline` is set, and delegates otherwise
pub struct FlakyStore {
    inner: MemoryStore,
    offline: AtomicBool,
}

impl FlakyStore {
    pub fn offline() -> Self {
        Self {
            inner: MemoryStore::new(1000),
            offline: AtomicBool::new(true),
        }
    }

    pub fn online() -> Self {
        Self {
            inner: MemoryStore::new(1000),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Connection("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<u64> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_by_pattern(&self, pattern: &str) -> StoreResult<u64> {
        self.check()?;
        self.inner.delete_by_pattern(pattern).await
    }

    async fn flush_all(&self) -> StoreResult<()> {
        self.check()?;
        self.inner.flush_all().await
    }

    async fn count_keys(&self, pattern: &str) -> StoreResult<u64> {
        self.check()?;
        self.inner.count_keys(pattern).await
    }

    async fn memory_usage(&self) -> StoreResult<Option<String>> {
        self.check()?;
        self.inner.memory_usage().await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Redis
    }
}

pub fn memory_cache() -> Arc<CacheLayer> {
    Arc::new(CacheLayer::new(
        Arc::new(MemoryStore::new(1000)),
        TtlPolicy::default(),
        "test:",
    ))
}

pub fn clocked_cache(clock: &ManualClock) -> Arc<CacheLayer> {
    Arc::new(CacheLayer::new(
        Arc::new(MemoryStore::with_clock(1000, Arc::new(clock.clone()))),
        TtlPolicy::default(),
        "test:",
    ))
}

pub fn token_for(participant_id: &str) -> String {
    TokenManager::new(TEST_SECRET)
        .generate_token(&Claims::new(participant_id))
        .unwrap()
}

pub fn server_manager() -> Arc<ServerManager> {
    server_manager_with_cache(memory_cache())
}

pub fn server_manager_with_cache(cache: Arc<CacheLayer>) -> Arc<ServerManager> {
    Arc::new(ServerManager::new(
        cache,
        Arc::new(MemoryMessageStore::new()),
        Arc::new(TokenManager::new(TEST_SECRET)),
        RateLimitConfig::default(),
    ))
}

/// Open an in-process connection and authenticate it as `participant_id`
pub async fn connect_as(
    server: &ServerManager,
    participant_id: &str,
) -> (Connection, mpsc::UnboundedReceiver<ServerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = server.connect(tx);
    server
        .authenticate(&connection.id, &token_for(participant_id))
        .await
        .unwrap();
    (connection, rx)
}

/// Drain every frame queued so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}
