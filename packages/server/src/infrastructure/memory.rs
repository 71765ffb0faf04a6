//! In-process transport backed by tokio channels.
//!
//! Lets the coordinator and sessions run without a network: the server side
//! gets a [`ChannelConnection`] and a [`ChannelInbound`], the test or embedding
//! code drives the other end through a [`ChannelPeer`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::domain::{ChatMessage, ClientConnection, ConnectionError, InboundMessage, InboundStream};

type InboundItem = Result<InboundMessage, ConnectionError>;

/// Outbound half handed to the coordinator
pub struct ChannelConnection {
    outbound: mpsc::UnboundedSender<ChatMessage>,
    closed: watch::Sender<bool>,
}

impl ChannelConnection {
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl ClientConnection for ChannelConnection {
    async fn send(&self, message: &ChatMessage) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Transport(
                "use of closed connection".to_string(),
            ));
        }
        // A dropped peer behaves like a socket that reached end of stream.
        self.outbound
            .send(message.clone())
            .map_err(|_| ConnectionError::EndOfStream)
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Inbound half read by the session
pub struct ChannelInbound {
    inbound: mpsc::UnboundedReceiver<InboundItem>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl InboundStream for ChannelInbound {
    async fn recv(&mut self) -> Result<InboundMessage, ConnectionError> {
        if *self.closed.borrow() {
            return Err(ConnectionError::Transport(
                "use of closed connection".to_string(),
            ));
        }
        tokio::select! {
            item = self.inbound.recv() => item.unwrap_or(Err(ConnectionError::EndOfStream)),
            _ = wait_closed(&mut self.closed) => Err(ConnectionError::Transport(
                "use of closed connection".to_string(),
            )),
        }
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            // Connection dropped without closing; only the inbound channel can end the read.
            std::future::pending::<()>().await;
        }
    }
}

/// The client end of an in-memory connection.
///
/// Dropping the peer ends the server's inbound stream.
pub struct ChannelPeer {
    to_server: mpsc::UnboundedSender<InboundItem>,
    from_server: mpsc::UnboundedReceiver<ChatMessage>,
    closed: watch::Receiver<bool>,
}

impl ChannelPeer {
    /// Send a message as the client would. Returns `false` once the server
    /// side has gone away.
    pub fn send(&self, username: &str, text: &str) -> bool {
        self.to_server
            .send(Ok(InboundMessage {
                username: username.to_string(),
                text: text.to_string(),
            }))
            .is_ok()
    }

    /// Make the server's next read fail with `error`
    pub fn fail(&self, error: ConnectionError) -> bool {
        self.to_server.send(Err(error)).is_ok()
    }

    /// Wait for the next message delivered to this client
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        self.from_server.recv().await
    }

    /// Take a delivered message if one is already queued
    pub fn try_recv(&mut self) -> Option<ChatMessage> {
        self.from_server.try_recv().ok()
    }

    /// Whether the server side closed the connection
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Create a connected in-memory transport
pub fn channel_connection() -> (Arc<ChannelConnection>, ChannelInbound, ChannelPeer) {
    let (outbound, from_server) = mpsc::unbounded_channel();
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = watch::channel(false);

    let connection = Arc::new(ChannelConnection {
        outbound,
        closed: closed_tx,
    });
    let inbound = ChannelInbound {
        inbound,
        closed: closed_rx.clone(),
    };
    let peer = ChannelPeer {
        to_server,
        from_server,
        closed: closed_rx,
    };
    (connection, inbound, peer)
}
