//! Domain layer: message model, session identity and connection traits.
//!
//! Nothing here depends on axum or on the coordinator; the transport
//! implementations in `infrastructure` depend on these types instead.

pub mod connection;
pub mod message;
pub mod session;

pub use connection::{ClientConnection, ConnectionError, InboundStream, close_code};
pub use message::{ChatMessage, InboundMessage, MessageKind};
pub use session::{SessionId, SessionState};

#[cfg(test)]
pub use connection::MockClientConnection;
