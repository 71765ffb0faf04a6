//! Transport implementations of the domain connection traits.
//!
//! - `websocket`: axum WebSocket connections
//! - `memory`: tokio channels, for in-process use and tests

pub mod memory;
pub mod websocket;

pub use memory::{ChannelConnection, ChannelInbound, ChannelPeer, channel_connection};
pub use websocket::{WebSocketConnection, WebSocketInbound};
