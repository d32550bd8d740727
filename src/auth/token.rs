use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use crate::core::message::ParticipantId;
use crate::error::{RelayError, Result};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (participant ID)
    pub sub: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
    /// Not before (as UTC timestamp)
    pub nbf: usize,
}

impl Claims {
    /// Creates claims valid for 24 hours
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self::with_expiration(participant_id, 24)
    }

    /// Creates claims with custom expiration
    pub fn with_expiration(participant_id: impl Into<String>, hours: usize) -> Self {
        let now = Utc::now().timestamp().max(0) as usize;
        Self {
            sub: participant_id.into(),
            exp: now + hours * 3600,
            iat: now,
            nbf: now,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        (Utc::now().timestamp().max(0) as usize) > self.exp
    }
}

/// Turns an identity claim presented by a client into a participant id
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<ParticipantId>;
}

/// Manages JWT token operations
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenManager {
    /// Creates a new token manager with a secret
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Generates a JWT token for the given claims
    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| RelayError::AuthError(format!("Failed to generate token: {}", e)))
    }

    /// Validates and decodes a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| RelayError::AuthError(format!("Invalid token: {}", e)))
    }

    /// Validates a token and returns the participant ID if valid
    pub fn validate_and_get_participant_id(&self, token: &str) -> Result<ParticipantId> {
        let claims = self.validate_token(token)?.claims;

        if claims.is_expired() {
            return Err(RelayError::AuthError("Token expired".to_string()));
        }
        if claims.sub.trim().is_empty() {
            return Err(RelayError::AuthError("Token has no subject".to_string()));
        }

        Ok(claims.sub)
    }
}

#[async_trait]
impl IdentityVerifier for TokenManager {
    async fn verify(&self, token: &str) -> Result<ParticipantId> {
        self.validate_and_get_participant_id(token)
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Extracts a token passed as a `bearer.<token>` websocket subprotocol
pub fn extract_protocol_token(protocols: &str) -> Option<String> {
    protocols
        .split(',')
        .map(str::trim)
        .find_map(|p| p.strip_prefix("bearer."))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
