//! WebSocket transport for the coordinator and sessions.
//!
//! An upgraded axum [`WebSocket`] is split in two: the sink is wrapped in a
//! [`WebSocketConnection`] that the coordinator writes to, the stream in a
//! [`WebSocketInbound`] that the session reads from. The two halves share how
//! the peer left, so a write after the peer's close frame reports that close
//! rather than a bare transport failure.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use tokio::sync::Mutex;

use crate::domain::{ChatMessage, ClientConnection, ConnectionError, InboundMessage, InboundStream};

/// Split an upgraded socket into its outbound and inbound halves
pub fn split(socket: WebSocket) -> (Arc<WebSocketConnection>, WebSocketInbound) {
    let (sink, stream) = socket.split();
    let peer_gone = Arc::new(PeerGone::default());
    (
        Arc::new(WebSocketConnection {
            sink: Mutex::new(sink),
            peer_gone: peer_gone.clone(),
        }),
        WebSocketInbound { stream, peer_gone },
    )
}

/// How the peer ended the connection, as seen by the reader
#[derive(Debug, Default)]
struct PeerGone(OnceLock<ConnectionError>);

impl PeerGone {
    /// Remember a read error if it means the peer left
    fn record(&self, error: &ConnectionError) {
        if matches!(error, ConnectionError::EndOfStream | ConnectionError::Closed(_)) {
            let _ = self.0.set(error.clone());
        }
    }

    /// Error to report for a failed write
    fn write_error(&self, detail: String) -> ConnectionError {
        self.0
            .get()
            .cloned()
            .unwrap_or(ConnectionError::Transport(detail))
    }
}

/// Outbound half: JSON text frames written to the client
pub struct WebSocketConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    peer_gone: Arc<PeerGone>,
}

#[async_trait]
impl ClientConnection for WebSocketConnection {
    async fn send(&self, message: &ChatMessage) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(message)
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| self.peer_gone.write_error(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            tracing::debug!("Closing websocket failed: {}", e);
        }
    }
}

/// Inbound half: decodes text and binary frames as JSON
pub struct WebSocketInbound {
    stream: SplitStream<WebSocket>,
    peer_gone: Arc<PeerGone>,
}

impl WebSocketInbound {
    async fn next_message(&mut self) -> Result<InboundMessage, ConnectionError> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
                None => return Err(ConnectionError::EndOfStream),
            };

            match msg {
                Message::Text(text) => return decode(text.as_str().as_bytes()),
                Message::Binary(data) => return decode(&data),
                Message::Close(frame) => {
                    return Err(ConnectionError::Closed(frame.map(|f| f.code)));
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // Ping/pong is handled automatically by the WebSocket protocol
                    tracing::trace!("Received ping/pong");
                }
            }
        }
    }
}

#[async_trait]
impl InboundStream for WebSocketInbound {
    async fn recv(&mut self) -> Result<InboundMessage, ConnectionError> {
        let result = self.next_message().await;
        if let Err(e) = &result {
            self.peer_gone.record(e);
        }
        result
    }
}

fn decode(payload: &[u8]) -> Result<InboundMessage, ConnectionError> {
    serde_json::from_slice(payload).map_err(|e| ConnectionError::Decode(e.to_string()))
}
