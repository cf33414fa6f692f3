//! Backend error types
//!
//! Errors raised by the auth, query and realtime collaborators.

use thiserror::Error;

/// Errors that can occur when talking to the hosted backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The server refused to join a realtime channel
    #[error("Channel {channel} rejected: {reason}")]
    JoinRejected { channel: String, reason: String },

    /// The realtime connection is gone and will not come back
    #[error("Realtime connection closed")]
    ChannelClosed,
}

impl BackendError {
    /// Classify a transport error the way every HTTP call does
    pub fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_connect() {
            BackendError::Unavailable
        } else {
            BackendError::Request(err)
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BackendError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BackendError::WebSocket(err.to_string())
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::ApiError {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "API error 500: boom");

        let err = BackendError::JoinRejected {
            channel: "earnings_changes".to_string(),
            reason: "unauthorized".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Channel earnings_changes rejected: unauthorized"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u64>("not json").unwrap_err();
        let err: BackendError = json_err.into();
        assert!(matches!(err, BackendError::Serialization(_)));
    }
}
