//! Error types for the chat client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket handshake failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The server closed the connection or a read/write failed mid-session
    #[error("Connection lost")]
    ConnectionLost,

    /// An outbound message could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
