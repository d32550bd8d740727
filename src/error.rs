use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RelayError {
    // Connection errors
    ConnectionNotFound(String),

    // Messages errors
    MessageParseError(String),
    MessageTooLarge(usize),

    // Auth errors
    AuthError(String),
    Unauthorized,
    Forbidden,

    // Validation errors
    ValidationError(String),

    // Persistence collaborator errors
    NotFound(String),
    Persistence(String),

    // Configuration errors
    ConfigError(String),
}

impl RelayError {
    /// Stable machine-readable code used in outbound error frames
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            Self::MessageParseError(_) => "INVALID_FRAME",
            Self::MessageTooLarge(_) => "FRAME_TOO_LARGE",
            Self::AuthError(_) => "AUTH_FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::ValidationError(_) => "INVALID_MESSAGE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE_FAILED",
            Self::ConfigError(_) => "CONFIG",
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionNotFound(id) => write!(f, "Connection not found: {}", id),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::MessageTooLarge(size) => write!(f, "Message too large: {} bytes", size),
            Self::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized: connection is not authenticated"),
            Self::Forbidden => write!(f, "Forbidden: insufficient permissions"),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MessageParseError(err.to_string())
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(RelayError::Unauthorized.code(), "UNAUTHORIZED");
        assert_eq!(RelayError::MessageTooLarge(9000).code(), "FRAME_TOO_LARGE");
        assert_eq!(RelayError::ValidationError("empty".into()).code(), "INVALID_MESSAGE");
        assert_eq!(RelayError::ConnectionNotFound("c".into()).code(), "CONNECTION_NOT_FOUND");
    }

    #[test]
    fn test_json_errors_become_invalid_frames() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "INVALID_FRAME");
        assert!(err.to_string().starts_with("Message parse error"));
    }
}
