//! Key/value store contract shared by the networked store and the
//! in-process fallback.
//!
//! Every operation is fallible and reports failure through [`StoreResult`];
//! nothing here panics or propagates to the transport. The store is never the
//! system of record, so callers treat a failure as a cache miss.

use async_trait::async_trait;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Which implementation is serving requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A call exceeded its per-call timeout
    Timeout(String),
    /// Connection refused, reset or dropped
    Connection(String),
    /// Write attempted against a read-only replica
    ReadOnly(String),
    /// Any other command failure
    Command(String),
    /// Value could not be (de)serialized
    Serialization(String),
}

impl StoreError {
    /// Timeouts, resets and read-only replicas are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_) | StoreError::Connection(_) | StoreError::ReadOnly(_)
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(op) => write!(f, "store call timed out: {}", op),
            Self::Connection(msg) => write!(f, "store connection error: {}", msg),
            Self::ReadOnly(msg) => write!(f, "store is read-only: {}", msg),
            Self::Command(msg) => write!(f, "store command failed: {}", msg),
            Self::Serialization(msg) => write!(f, "cache value serialization failed: {}", msg),
        }
    }
}

impl Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; expired entries read as absent
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store a value, replacing any previous one, expiring after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Remove a key, returning how many entries were removed
    async fn delete(&self, key: &str) -> StoreResult<u64>;

    /// Remove every key matching a glob (`*`, `?`)
    async fn delete_by_pattern(&self, pattern: &str) -> StoreResult<u64>;

    /// Drop everything in the store
    async fn flush_all(&self) -> StoreResult<()>;

    /// Count live keys matching a glob
    async fn count_keys(&self, pattern: &str) -> StoreResult<u64>;

    /// Human-readable memory usage, when the backend can report it
    async fn memory_usage(&self) -> StoreResult<Option<String>>;

    /// Connectivity probe
    async fn ping(&self) -> StoreResult<()>;

    fn backend(&self) -> StoreBackend;
}
