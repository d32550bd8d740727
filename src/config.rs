//! Server configuration module
//! Handles dynamic configuration parameters for the relay server

use crate::constants::{
    DEFAULT_FALLBACK_CAPACITY, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_KEY_PREFIX,
    DEFAULT_PORT, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW_SECS, DEFAULT_STORE_RETRIES,
    DEFAULT_STORE_TIMEOUT_MS, DEFAULT_TYPING_LIMIT, DEFAULT_TYPING_WINDOW_SECS,
    STORE_RETRY_BASE_DELAY_MS, STORE_RETRY_MAX_DELAY_MS, TTL_DAILY_SECS, TTL_LONG_SECS,
    TTL_MEDIUM_SECS, TTL_SHORT_SECS, TTL_WEEKLY_SECS,
};
use crate::error::{RelayError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Expiration tiers applied by the cache layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
    pub daily: Duration,
    pub weekly: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(TTL_SHORT_SECS),
            medium: Duration::from_secs(TTL_MEDIUM_SECS),
            long: Duration::from_secs(TTL_LONG_SECS),
            daily: Duration::from_secs(TTL_DAILY_SECS),
            weekly: Duration::from_secs(TTL_WEEKLY_SECS),
        }
    }
}

/// Backing store and cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Address of the networked store, e.g. `redis://127.0.0.1:6379/0`
    pub store_url: String,
    pub store_username: Option<String>,
    pub store_password: Option<String>,
    /// Bound on every individual store call
    pub call_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Namespace prepended to every key written by this process
    pub key_prefix: String,
    /// Entry bound of the in-process fallback store
    pub fallback_capacity: usize,
    pub ttl: TtlPolicy,
}

impl CacheConfig {
    pub fn new(store_url: impl Into<String>) -> Self {
        Self {
            store_url: store_url.into(),
            store_username: None,
            store_password: None,
            call_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            max_retries: DEFAULT_STORE_RETRIES,
            retry_base_delay: Duration::from_millis(STORE_RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_millis(STORE_RETRY_MAX_DELAY_MS),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            fallback_capacity: DEFAULT_FALLBACK_CAPACITY,
            ttl: TtlPolicy::default(),
        }
    }
}

/// Default throttling parameters
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Default (limit, window) offered to external callers
    pub default_limit: u32,
    pub default_window: Duration,
    /// Typing indicator updates allowed per (actor, conversation) and window
    pub typing_limit: u32,
    pub typing_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_RATE_LIMIT,
            default_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
            typing_limit: DEFAULT_TYPING_LIMIT,
            typing_window: Duration::from_secs(DEFAULT_TYPING_WINDOW_SECS),
        }
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Connections without inbound traffic for this long are closed
    pub idle_timeout: Duration,
    /// JWT secret for identity claim validation
    pub jwt_secret: String,
    pub cache: CacheConfig,
    pub rate_limits: RateLimitConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Create a test configuration - DANGEROUS: Only for testing!
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            jwt_secret: "test-jwt-secret-only-for-unit-tests-never-use-in-production".to_string(),
            cache: CacheConfig::new("redis://127.0.0.1:6379"),
            rate_limits: RateLimitConfig::default(),
        }
    }

    /// Validate that a secret meets security requirements
    fn validate_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(RelayError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RelayError::ConfigError(
                "JWT secret should contain mixed characters (letters, numbers, symbols)".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("CHAT_RELAY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env_or("CHAT_RELAY_PORT", DEFAULT_PORT);
        let idle_secs = env_or("CHAT_RELAY_IDLE_TIMEOUT", DEFAULT_IDLE_TIMEOUT_SECS);

        // The store address is the one setting without which no degraded service is possible
        let store_url = env::var("CHAT_RELAY_STORE_URL")
            .or_else(|_| env::var("REDIS_URL"))
            .map_err(|_| {
                RelayError::ConfigError(
                    "CHAT_RELAY_STORE_URL environment variable is required (e.g. redis://127.0.0.1:6379)"
                        .to_string(),
                )
            })?;
        if store_url.trim().is_empty() {
            return Err(RelayError::ConfigError(
                "CHAT_RELAY_STORE_URL must not be empty".to_string(),
            ));
        }

        let jwt_secret = env::var("CHAT_RELAY_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                RelayError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_secret(&jwt_secret)?;

        let defaults = TtlPolicy::default();
        let ttl = TtlPolicy {
            short: Duration::from_secs(env_or("CHAT_RELAY_TTL_SHORT", defaults.short.as_secs())),
            medium: Duration::from_secs(env_or("CHAT_RELAY_TTL_MEDIUM", defaults.medium.as_secs())),
            long: Duration::from_secs(env_or("CHAT_RELAY_TTL_LONG", defaults.long.as_secs())),
            daily: Duration::from_secs(env_or("CHAT_RELAY_TTL_DAILY", defaults.daily.as_secs())),
            weekly: Duration::from_secs(env_or("CHAT_RELAY_TTL_WEEKLY", defaults.weekly.as_secs())),
        };

        let mut cache = CacheConfig::new(store_url);
        cache.store_username = env::var("CHAT_RELAY_STORE_USERNAME").ok();
        cache.store_password = env::var("CHAT_RELAY_STORE_PASSWORD").ok();
        cache.call_timeout = Duration::from_millis(env_or(
            "CHAT_RELAY_STORE_TIMEOUT_MS",
            DEFAULT_STORE_TIMEOUT_MS,
        ));
        cache.max_retries = env_or("CHAT_RELAY_STORE_RETRIES", DEFAULT_STORE_RETRIES).max(1);
        cache.key_prefix = env::var("CHAT_RELAY_KEY_PREFIX").unwrap_or(DEFAULT_KEY_PREFIX.to_string());
        cache.fallback_capacity =
            env_or("CHAT_RELAY_FALLBACK_CAPACITY", DEFAULT_FALLBACK_CAPACITY).max(1);
        cache.ttl = ttl;

        let rate_limits = RateLimitConfig {
            default_limit: env_or("CHAT_RELAY_RATE_LIMIT", DEFAULT_RATE_LIMIT),
            default_window: Duration::from_secs(env_or(
                "CHAT_RELAY_RATE_WINDOW",
                DEFAULT_RATE_WINDOW_SECS,
            )),
            typing_limit: env_or("CHAT_RELAY_TYPING_LIMIT", DEFAULT_TYPING_LIMIT),
            typing_window: Duration::from_secs(env_or(
                "CHAT_RELAY_TYPING_WINDOW",
                DEFAULT_TYPING_WINDOW_SECS,
            )),
        };

        Ok(Self {
            host,
            port,
            idle_timeout: Duration::from_secs(idle_secs),
            jwt_secret,
            cache,
            rate_limits,
        })
    }
}
