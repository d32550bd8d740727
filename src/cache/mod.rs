//! Cache layer with a networked store and an in-process fallback

pub mod keys;
pub mod layer;
pub mod memory;
pub mod redis_store;
pub mod retry;
pub mod store;

pub use layer::{CacheLayer, CacheStats, CacheTtl, LeaderboardEntry, TtlPolicy, WarmEntry, WarmReport};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{KeyValueStore, StoreBackend, StoreError, StoreResult};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::CacheConfig;

/// Probe `primary` once and return it, or an in-process fallback if the
/// probe fails or times out. The choice holds until process restart.
pub async fn select_store(
    primary: Arc<dyn KeyValueStore>,
    probe_timeout: Duration,
    fallback_capacity: usize,
) -> Arc<dyn KeyValueStore> {
    match timeout(probe_timeout, primary.ping()).await {
        Ok(Ok(())) => {
            log::info!("Backing store reachable, using {:?} backend", primary.backend());
            primary
        }
        Ok(Err(e)) => {
            log::warn!("Backing store probe failed ({}), installing in-process fallback", e);
            Arc::new(MemoryStore::new(fallback_capacity))
        }
        Err(_) => {
            log::warn!(
                "Backing store probe timed out after {:?}, installing in-process fallback",
                probe_timeout
            );
            Arc::new(MemoryStore::new(fallback_capacity))
        }
    }
}

/// Startup factory: networked store when reachable, fallback otherwise
pub async fn connect_store(config: &CacheConfig) -> Arc<dyn KeyValueStore> {
    match RedisStore::open(config) {
        Ok(store) => {
            // The probe makes up to `max_retries` attempts, each bounded by the call timeout
            let probe_timeout = config.call_timeout * config.max_retries.max(1) + config.retry_max_delay;
            select_store(Arc::new(store), probe_timeout, config.fallback_capacity).await
        }
        Err(e) => {
            log::warn!("Backing store client unavailable ({}), installing in-process fallback", e);
            Arc::new(MemoryStore::new(config.fallback_capacity))
        }
    }
}

/// Build the process-wide cache layer
pub async fn build_cache(config: &CacheConfig) -> Arc<CacheLayer> {
    let store = connect_store(config).await;
    Arc::new(CacheLayer::new(store, config.ttl, config.key_prefix.clone()))
}
