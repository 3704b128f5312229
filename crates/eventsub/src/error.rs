//! Error types shared by the token lifecycle and the EventSub session.

use thiserror::Error;

use crate::session::{CloseReason, RevocationReason};

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end a run.
///
/// Recoverable conditions (duplicate messages, a silent connection that is
/// replaced by a reconnect) are handled inside the session and never show up
/// here.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable token and interactive login is not allowed.
    #[error("Not authenticated: no usable access token and interactive login is disabled")]
    NotAuthenticated,

    /// The refresh token was rejected - re-login required.
    #[error("You've been logged out of Twitch. Restart the app and log in again")]
    SessionExpired,

    /// Unexpected non-2xx response from the provider.
    #[error("Twitch API error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    /// A message did not match any known (type, subscription) pair.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server revoked the subscription.
    #[error("EventSub subscription was revoked: {0}")]
    Revoked(RevocationReason),

    /// The server closed the EventSub connection.
    #[error("Twitch closed the connection: {0}")]
    ConnectionClosed(CloseReason),

    /// The interactive authorization flow failed or timed out.
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// Missing or malformed local configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl Error {
    /// Create a protocol violation error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create an upstream error from an HTTP status and message.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error requires the user to log in again.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::SessionExpired)
    }

    /// HTTP status carried by an upstream error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_relogin() {
        assert!(Error::NotAuthenticated.requires_relogin());
        assert!(Error::SessionExpired.requires_relogin());
        assert!(!Error::upstream(500, "boom").requires_relogin());
        assert!(!Error::protocol("bad").requires_relogin());
    }

    #[test]
    fn test_upstream_display_carries_status() {
        let err = Error::upstream(503, "Service Unavailable");
        assert_eq!(err.status(), Some(503));
        assert_eq!(
            err.to_string(),
            "Twitch API error (HTTP 503): Service Unavailable"
        );
    }
}
