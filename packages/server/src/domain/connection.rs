//! Connection traits used by the coordinator and sessions.
//!
//! The transport (WebSocket, in-memory channels) lives in the infrastructure
//! layer and implements these traits; the use cases only see the traits.

use async_trait::async_trait;
use thiserror::Error;

use super::{ChatMessage, InboundMessage};

/// WebSocket close codes the server cares about (RFC 6455 §7.4.1).
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away (browser tab closed, server shutting down)
    pub const AWAY: u16 = 1001;
    /// Connection dropped without a close frame
    pub const ABNORMAL: u16 = 1006;
}

/// Transport-level failure on a single connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The stream ended without a close frame
    #[error("end of stream")]
    EndOfStream,

    /// The peer sent a close frame, with its close code if any
    #[error("connection closed (code: {0:?})")]
    Closed(Option<u16>),

    /// The inbound payload could not be decoded
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// Any other read or write failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Whether a read failure is an ordinary disconnect that should not be
    /// logged as an error.
    pub fn is_expected_on_read(&self) -> bool {
        match self {
            Self::EndOfStream | Self::Closed(None) => true,
            Self::Closed(Some(code)) => matches!(
                *code,
                close_code::NORMAL | close_code::AWAY | close_code::ABNORMAL
            ),
            Self::Decode(_) | Self::Transport(_) => false,
        }
    }

    /// Whether a write failure should leave the recipient registered.
    ///
    /// Anything else makes the coordinator close and evict the recipient.
    pub fn is_expected_on_write(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Closed(Some(close_code::AWAY)))
    }
}

/// Outbound half of a client connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientConnection: Send + Sync {
    /// Deliver one message to the client
    async fn send(&self, message: &ChatMessage) -> Result<(), ConnectionError>;

    /// Close the connection. Closing twice is harmless.
    async fn close(&self);
}

/// Inbound half of a client connection
#[async_trait]
pub trait InboundStream: Send {
    /// Wait for the next decoded message from the client
    async fn recv(&mut self) -> Result<InboundMessage, ConnectionError>;
}
