//! UseCase: クライアントセッション
//!
//! One session per connection. It owns the inbound half and the connection
//! handle, turns inbound messages into coordinator requests, and never touches
//! the registry or another client's connection.
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 名前の設定・変更で announce が配信されること
//! - 空のテキストでは message が配信されないこと
//! - 読み込み終了時に必ず解除・切断されること
//!
//! ### どのような状況を想定しているか
//! - 正常系：名前設定 → 発言 → 切断
//! - エッジケース：空白だけの名前やテキスト、同じ名前の再送
//! - 異常系：想定外の読み込みエラー、コーディネーター停止

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::{
    ChatMessage, ClientConnection, ConnectionError, InboundMessage, InboundStream, SessionId,
    SessionState,
};

use super::{
    coordinator::{CoordinatorHandle, RegisteredSession},
    error::CoordinatorError,
};

/// Why a session's read loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client went away or the stream failed
    Connection(ConnectionError),
    /// The coordinator no longer accepts requests
    CoordinatorStopped,
}

/// One connected participant
pub struct ClientSession<S> {
    id: SessionId,
    name: watch::Sender<String>,
    state: SessionState,
    connection: Arc<dyn ClientConnection>,
    inbound: S,
    coordinator: CoordinatorHandle,
}

impl<S: InboundStream> ClientSession<S> {
    pub fn new(
        connection: Arc<dyn ClientConnection>,
        inbound: S,
        coordinator: CoordinatorHandle,
    ) -> Self {
        let (name, _) = watch::channel(String::new());
        Self {
            id: SessionId::generate(),
            name,
            state: SessionState::Connected,
            connection,
            inbound,
            coordinator,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current display name (empty until the client sends one)
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Register, serve the connection until it ends, then unregister and
    /// close it.
    ///
    /// Consumes the session, so the cleanup runs exactly once.
    pub async fn run(mut self) -> DisconnectReason {
        let registration = RegisteredSession::new(self.id, self.name.subscribe(), &self.connection);

        let reason = match self.coordinator.register(registration).await {
            Ok(()) => self.read_loop().await,
            Err(CoordinatorError::Stopped) => DisconnectReason::CoordinatorStopped,
        };

        self.disconnect().await;
        reason
    }

    async fn read_loop(&mut self) -> DisconnectReason {
        loop {
            let msg = match self.inbound.recv().await {
                Ok(msg) => msg,
                Err(e) => {
                    if e.is_expected_on_read() {
                        tracing::debug!(session = %self.id, "Connection closed: {}", e);
                    } else {
                        tracing::warn!(session = %self.id, "[{}] read error: {}", self.name(), e);
                    }
                    return DisconnectReason::Connection(e);
                }
            };

            tracing::debug!(session = %self.id, "[{}] received msg: {:?}", self.name(), msg);

            if let Err(CoordinatorError::Stopped) = self.handle_inbound(msg).await {
                tracing::warn!(session = %self.id, "Coordinator stopped, closing session");
                return DisconnectReason::CoordinatorStopped;
            }
        }
    }

    /// Turn one inbound message into at most one announce and one message
    async fn handle_inbound(&mut self, msg: InboundMessage) -> Result<(), CoordinatorError> {
        let username = msg.username.trim();
        let renamed = !username.is_empty() && *self.name.borrow() != username;
        if renamed {
            self.name.send_replace(username.to_string());
            self.state = self.state.on_renamed();
            tracing::info!(session = %self.id, "Name websocket \"{}\"", username);
            self.coordinator
                .publish(ChatMessage::announce(username))
                .await?;
        }

        if !msg.text.trim().is_empty() {
            self.coordinator
                .publish(ChatMessage::message(self.name(), msg.text))
                .await?;
            self.state = self.state.on_message();
        }

        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.coordinator.unregister(self.id).await {
            tracing::debug!(session = %self.id, "Unregister skipped: {}", e);
        }
        self.connection.close().await;
        self.state = SessionState::Disconnected;
        tracing::debug!(session = %self.id, "Session disconnected");
    }
}
