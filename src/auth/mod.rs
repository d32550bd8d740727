//! Authentication module

pub mod token;

// Re-export main components
pub use token::{extract_bearer_token, extract_protocol_token, Claims, IdentityVerifier, TokenManager};
