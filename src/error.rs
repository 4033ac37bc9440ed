//! Error types for Mirai Bridge

use std::time::Duration;

use thiserror::Error;

use crate::core::{Identity, Tag};

/// Result type alias using Mirai Bridge's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Mirai Bridge
#[derive(Error, Debug)]
pub enum Error {
    /// No live session for the identity
    #[error("Not connected: no live session for {0}")]
    NotConnected(Identity),

    /// No response arrived within the call window
    #[error("Call timed out: no response for syncId {tag} within {timeout:?}")]
    CallTimeout {
        /// Correlation tag of the abandoned call
        tag: Tag,
        /// Configured call timeout
        timeout: Duration,
    },

    /// Gateway answered with a non-success status
    #[error("Remote call failed: {0}")]
    RemoteCallFailed(serde_json::Value),

    /// Writing the envelope to the channel failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Gateway refused the identity during the handshake
    #[error("Handshake rejected for {identity} (code {code}): {message}")]
    HandshakeRejected {
        /// Rejected identity
        identity: Identity,
        /// Status code from the handshake frame
        code: i64,
        /// Message from the handshake frame
        message: String,
    },

    /// A tag was registered twice while still pending
    #[error("Duplicate correlation tag: {0}")]
    DuplicateTag(Tag),

    /// Connection-level fault (open, read, closed channel)
    #[error("Connection error: {0}")]
    Connection(String),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if the caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NotConnected(_)
                | Error::CallTimeout { .. }
                | Error::SendFailed(_)
                | Error::Connection(_)
                | Error::WebSocket(_)
        )
    }

    /// Check if the error permanently stops an identity's session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::HandshakeRejected { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("Invalid endpoint URL: {}", err))
    }
}
