//! In-process fallback store
//!
//! A bounded LRU map from key to (value, expiry). Expiry is checked lazily on
//! read; an expired entry is removed the first time it is observed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use super::keys::glob_match;
use super::store::{KeyValueStore, StoreBackend, StoreError, StoreResult};
use crate::core::clock::{system_clock, SharedClock};

struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct MemoryStore {
    entries: Mutex<LruCache<String, MemoryEntry>>,
    clock: SharedClock,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, system_clock())
    }

    pub fn with_clock(capacity: usize, clock: SharedClock) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            clock,
        }
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, LruCache<String, MemoryEntry>>> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Command(format!("fallback store lock poisoned: {}", e)))
    }

    /// Number of entries currently held, expired ones included
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.lock()?;

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Command(format!("invalid ttl: {}", e)))?;
        let expires_at = self.clock.now() + ttl;

        let mut entries = self.lock()?;
        if let Some((evicted, _)) = entries.push(key.to_string(), MemoryEntry { value, expires_at }) {
            if evicted != key {
                log::debug!("Fallback store at capacity, evicted {}", evicted);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<u64> {
        let mut entries = self.lock()?;
        Ok(entries.pop(key).map(|_| 1).unwrap_or(0))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> StoreResult<u64> {
        let mut entries = self.lock()?;
        let matching: Vec<String> = entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &matching {
            entries.pop(key);
        }
        Ok(matching.len() as u64)
    }

    async fn flush_all(&self) -> StoreResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn count_keys(&self, pattern: &str) -> StoreResult<u64> {
        let now = self.clock.now();
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .filter(|(key, entry)| entry.expires_at > now && glob_match(pattern, key))
            .count() as u64)
    }

    async fn memory_usage(&self) -> StoreResult<Option<String>> {
        let entries = self.lock()?;
        let bytes: usize = entries
            .iter()
            .map(|(key, entry)| key.len() + entry.value.len())
            .sum();
        Ok(Some(format!("{}B", bytes)))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use std::sync::Arc;

    fn store_with_clock() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new();
        (MemoryStore::with_clock(16, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_expired_entry_reads_absent_and_is_removed() {
        let (store, clock) = store_with_clock();
        store.set("k", "v".to_string(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_refreshes_expiry() {
        let (store, clock) = store_with_clock();
        store.set("k", "1".to_string(), Duration::from_secs(5)).await.unwrap();
        clock.advance(Duration::from_secs(4));
        store.set("k", "2".to_string(), Duration::from_secs(5)).await.unwrap();
        clock.advance(Duration::from_secs(4));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_delete_by_pattern_and_count() {
        let (store, _) = store_with_clock();
        let ttl = Duration::from_secs(60);
        store.set("user:1:a", "x".into(), ttl).await.unwrap();
        store.set("user:1:b", "x".into(), ttl).await.unwrap();
        store.set("user:2:a", "x".into(), ttl).await.unwrap();

        assert_eq!(store.count_keys("user:*").await.unwrap(), 3);
        assert_eq!(store.delete_by_pattern("user:1:*").await.unwrap(), 2);
        assert_eq!(store.count_keys("user:*").await.unwrap(), 1);
        assert_eq!(store.delete("user:2:a").await.unwrap(), 1);
        assert_eq!(store.delete("user:2:a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let store = MemoryStore::new(2);
        let ttl = Duration::from_secs(60);
        store.set("a", "1".into(), ttl).await.unwrap();
        store.set("b", "2".into(), ttl).await.unwrap();
        store.get("a").await.unwrap();
        store.set("c", "3".into(), ttl).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_none());
        assert!(store.get("c").await.unwrap().is_some());
    }
}
