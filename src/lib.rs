//! Chat Relay - real-time delivery of conversation events over WebSockets
//!
//! This library provides the relay's building blocks: a cache layer with a
//! networked store and in-process fallback, a store-backed rate limiter, the
//! connection registry and the per-conversation message router.

pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
