//! Error types for notify-link.

use thiserror::Error;

/// Errors surfaced by the notification client.
///
/// Every payload is a plain string so the error can be cloned: a single-flight
/// token refresh hands the same outcome to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyLinkError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for notify-link operations.
pub type Result<T> = std::result::Result<T, NotifyLinkError>;

impl NotifyLinkError {
    /// `true` when the server refused the credential (HTTP 401/403 or a
    /// handshake rejected for auth reasons).
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            Self::AuthenticationError(_) => true,
            Self::ServerError { status_code, .. } => *status_code == 401 || *status_code == 403,
            _ => false,
        }
    }

    /// `true` when retrying the same request may succeed without any change
    /// on the client side.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::TimeoutError(_))
    }
}

impl From<reqwest::Error> for NotifyLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimeoutError(err.to_string())
        } else if err.is_decode() {
            Self::SerializationError(err.to_string())
        } else if let Some(status) = err.status() {
            Self::ServerError {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for NotifyLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_rejection_classification() {
        assert!(NotifyLinkError::AuthenticationError("nope".into()).is_auth_rejection());
        assert!(NotifyLinkError::ServerError {
            status_code: 401,
            message: "token_not_valid".into()
        }
        .is_auth_rejection());
        assert!(!NotifyLinkError::ServerError {
            status_code: 500,
            message: "boom".into()
        }
        .is_auth_rejection());
        assert!(!NotifyLinkError::SessionExpired("gone".into()).is_auth_rejection());
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let err: NotifyLinkError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, NotifyLinkError::SerializationError(_)));
        assert!(!err.is_retriable());
    }
}
