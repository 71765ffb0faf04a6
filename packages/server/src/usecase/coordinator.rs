//! UseCase: ブロードキャストコーディネーター
//!
//! The coordinator is the only owner of the registry of live sessions. It
//! runs as a single task and handles register, unregister and publish
//! requests one at a time, so the registry needs no lock.
//!
//! ## 要求の受け渡し
//!
//! Each request type has its own channel. A submitter waits until the loop
//! has dequeued its request (a rendezvous, like an unbuffered channel), so
//! requests from one session reach the loop in the order the session made
//! them, and a busy coordinator stalls every submitter.
//!
//! ## テスト実装の作業記録
//!
//! - 登録・解除・配信の基本動作
//! - 名前による送信者の除外（別接続でも同名なら届かない）
//! - タイムスタンプはサーバー側で上書きされる
//! - 送信失敗した接続は閉じられ、レジストリから外される
//! - 並行した登録・解除・配信の後でもレジストリが一貫している

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use parlor_shared::time::{Clock, format_rfc3339};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::domain::{ChatMessage, ClientConnection, SessionId};

use super::error::CoordinatorError;

/// Buffer size of each request channel. Submitters still wait for the loop to
/// take their request, see [`CoordinatorHandle`].
const REQUEST_CHANNEL_CAPACITY: usize = 1;

/// A session as the coordinator sees it: its id, a view of its current
/// display name and a non-owning reference to its connection.
pub struct RegisteredSession {
    id: SessionId,
    name: watch::Receiver<String>,
    connection: Weak<dyn ClientConnection>,
}

impl RegisteredSession {
    pub fn new(
        id: SessionId,
        name: watch::Receiver<String>,
        connection: &Arc<dyn ClientConnection>,
    ) -> Self {
        Self {
            id,
            name,
            connection: Arc::downgrade(connection),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Display name the session currently has
    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    fn connection(&self) -> Option<Arc<dyn ClientConnection>> {
        self.connection.upgrade()
    }
}

/// Live sessions eligible to receive broadcasts.
///
/// Only the coordinator loop mutates it. Iteration order is unspecified.
#[derive(Default)]
pub struct Registry {
    sessions: HashMap<SessionId, RegisteredSession>,
}

impl Registry {
    fn insert(&mut self, session: RegisteredSession) {
        self.sessions.insert(session.id, session);
    }

    fn remove(&mut self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Current display names of every registered session
    pub fn names(&self) -> Vec<String> {
        self.sessions.values().map(RegisteredSession::name).collect()
    }

    fn iter(&self) -> impl Iterator<Item = &RegisteredSession> {
        self.sessions.values()
    }
}

/// A request plus the receipt the loop sends back once it has taken it.
struct Envelope<T> {
    payload: T,
    received: oneshot::Sender<()>,
}

impl<T> Envelope<T> {
    fn open(self) -> T {
        // The submitter may have given up waiting; nothing to do then.
        let _ = self.received.send(());
        self.payload
    }
}

/// Cloneable handle used by sessions to talk to the coordinator.
///
/// Every method waits until the coordinator loop has taken the request, and
/// fails with [`CoordinatorError::Stopped`] once the loop is gone.
#[derive(Clone)]
pub struct CoordinatorHandle {
    register_tx: mpsc::Sender<Envelope<RegisteredSession>>,
    unregister_tx: mpsc::Sender<Envelope<SessionId>>,
    publish_tx: mpsc::Sender<Envelope<ChatMessage>>,
}

impl CoordinatorHandle {
    /// Add a session to the registry
    pub async fn register(&self, session: RegisteredSession) -> Result<(), CoordinatorError> {
        submit(&self.register_tx, session).await
    }

    /// Remove a session from the registry; unknown ids are ignored
    pub async fn unregister(&self, id: SessionId) -> Result<(), CoordinatorError> {
        submit(&self.unregister_tx, id).await
    }

    /// Fan a message out to every registered session not named like its sender
    pub async fn publish(&self, message: ChatMessage) -> Result<(), CoordinatorError> {
        submit(&self.publish_tx, message).await
    }
}

async fn submit<T>(tx: &mpsc::Sender<Envelope<T>>, payload: T) -> Result<(), CoordinatorError> {
    let (received, receipt) = oneshot::channel();
    tx.send(Envelope { payload, received })
        .await
        .map_err(|_| CoordinatorError::Stopped)?;
    receipt.await.map_err(|_| CoordinatorError::Stopped)
}

/// Single serialization point for join, leave and fan-out
pub struct BroadcastCoordinator {
    registry: Registry,
    register_rx: mpsc::Receiver<Envelope<RegisteredSession>>,
    unregister_rx: mpsc::Receiver<Envelope<SessionId>>,
    publish_rx: mpsc::Receiver<Envelope<ChatMessage>>,
    clock: Arc<dyn Clock>,
}

impl BroadcastCoordinator {
    /// Create a coordinator and the handle that feeds it.
    ///
    /// Nothing is processed until [`run`](Self::run) is awaited.
    pub fn new(clock: Arc<dyn Clock>) -> (Self, CoordinatorHandle) {
        let (register_tx, register_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (publish_tx, publish_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        let coordinator = Self {
            registry: Registry::default(),
            register_rx,
            unregister_rx,
            publish_rx,
            clock,
        };
        let handle = CoordinatorHandle {
            register_tx,
            unregister_tx,
            publish_tx,
        };
        (coordinator, handle)
    }

    /// Create a coordinator and run it on its own task.
    pub fn spawn(clock: Arc<dyn Clock>) -> (CoordinatorHandle, JoinHandle<Registry>) {
        let (coordinator, handle) = Self::new(clock);
        (handle, tokio::spawn(coordinator.run()))
    }

    /// Process requests until every [`CoordinatorHandle`] is dropped, then
    /// return the final registry.
    pub async fn run(mut self) -> Registry {
        tracing::debug!("Broadcast coordinator started");

        loop {
            tokio::select! {
                Some(envelope) = self.register_rx.recv() => {
                    self.handle_register(envelope.open());
                }
                Some(envelope) = self.unregister_rx.recv() => {
                    self.handle_unregister(envelope.open());
                }
                Some(envelope) = self.publish_rx.recv() => {
                    self.handle_publish(envelope.open()).await;
                }
                else => break,
            }
        }

        tracing::debug!(
            sessions = self.registry.len(),
            "Broadcast coordinator stopped"
        );
        self.registry
    }

    fn handle_register(&mut self, session: RegisteredSession) {
        let id = session.id;
        self.registry.insert(session);
        tracing::info!(
            session = %id,
            sessions = self.registry.len(),
            "A new websocket connection is registered"
        );
    }

    fn handle_unregister(&mut self, id: SessionId) {
        if self.registry.remove(&id) {
            tracing::info!(
                session = %id,
                sessions = self.registry.len(),
                "A websocket connection is unregistered"
            );
        } else {
            tracing::debug!(session = %id, "Unregister ignored, session is not registered");
        }
    }

    async fn handle_publish(&mut self, message: ChatMessage) {
        tracing::debug!(
            kind = ?message.kind,
            from = %message.username,
            "Broadcasting: {}",
            message.text
        );

        let mut evicted = Vec::new();

        for session in self.registry.iter() {
            let name = session.name();
            if name == message.username {
                continue;
            }

            let Some(connection) = session.connection() else {
                tracing::debug!(session = %session.id, "Connection already dropped, evicting");
                evicted.push(session.id);
                continue;
            };

            let stamped = message.stamped(format_rfc3339(self.clock.now_utc()));
            if let Err(e) = connection.send(&stamped).await {
                if e.is_expected_on_write() {
                    tracing::debug!(session = %session.id, "[{}] peer is gone: {}", name, e);
                    continue;
                }
                tracing::warn!(session = %session.id, "[{}] connection error: {}", name, e);
                connection.close().await;
                evicted.push(session.id);
            }
        }

        for id in evicted {
            self.registry.remove(&id);
            tracing::info!(
                session = %id,
                sessions = self.registry.len(),
                "Evicted websocket connection after failed delivery"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ConnectionError, MessageKind, MockClientConnection, close_code},
        infrastructure::memory::{ChannelPeer, channel_connection},
    };
    use parlor_shared::time::{FixedClock, SystemClock};
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    /// A registered participant backed by an in-memory connection
    struct TestMember {
        id: SessionId,
        name: watch::Sender<String>,
        _connection: Arc<dyn ClientConnection>,
        peer: ChannelPeer,
    }

    impl TestMember {
        async fn join(handle: &CoordinatorHandle, name: &str) -> Self {
            let (connection, _inbound, peer) = channel_connection();
            let connection: Arc<dyn ClientConnection> = connection;
            let (name_tx, name_rx) = watch::channel(name.to_string());
            let id = SessionId::generate();
            handle
                .register(RegisteredSession::new(id, name_rx, &connection))
                .await
                .unwrap();
            Self {
                id,
                name: name_tx,
                _connection: connection,
                peer,
            }
        }

        async fn recv(&mut self) -> ChatMessage {
            timeout(RECV_TIMEOUT, self.peer.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("connection closed")
        }
    }

    fn fixed_clock() -> Arc<dyn Clock> {
        // 2021-01-18T12:00:00Z
        Arc::new(FixedClock::from_unix_secs(1_610_971_200))
    }

    #[tokio::test]
    async fn test_publish_reaches_every_other_name() {
        // テスト項目: 送信者以外の全セッションにメッセージが配信される
        // given (前提条件):
        let (handle, _join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut alice = TestMember::join(&handle, "alice").await;
        let mut bob = TestMember::join(&handle, "bob").await;
        let mut carol = TestMember::join(&handle, "carol").await;

        // when (操作):
        handle
            .publish(ChatMessage::message("alice", "hello"))
            .await
            .unwrap();
        handle
            .publish(ChatMessage::message("bob", "sync"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(bob.recv().await.text, "hello");
        assert_eq!(carol.recv().await.text, "hello");
        assert_eq!(carol.recv().await.text, "sync");
        // alice の最初の受信は bob の sync（自分の hello は届かない）
        let first = alice.recv().await;
        assert_eq!(first.username, "bob");
        assert_eq!(first.text, "sync");
    }

    #[tokio::test]
    async fn test_publish_excludes_sessions_sharing_the_sender_name() {
        // テスト項目: 送信者と同じ名前の別セッションにも配信されない
        // given (前提条件):
        let (handle, _join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut alice_a = TestMember::join(&handle, "alice").await;
        let _alice_b = TestMember::join(&handle, "alice").await;
        let mut bob = TestMember::join(&handle, "bob").await;

        // when (操作):
        handle
            .publish(ChatMessage::message("alice", "from b"))
            .await
            .unwrap();
        handle
            .publish(ChatMessage::message("bob", "sync"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(bob.recv().await.text, "from b");
        assert_eq!(alice_a.recv().await.text, "sync");
    }

    #[tokio::test]
    async fn test_publish_uses_the_current_name() {
        // テスト項目: 除外判定は登録時ではなく配信時点の名前で行われる
        // given (前提条件):
        let (handle, _join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut member = TestMember::join(&handle, "").await;
        let mut bob = TestMember::join(&handle, "bob").await;
        member.name.send_replace("alice".to_string());

        // when (操作):
        handle
            .publish(ChatMessage::message("alice", "hi"))
            .await
            .unwrap();
        handle
            .publish(ChatMessage::message("bob", "sync"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(bob.recv().await.text, "hi");
        assert_eq!(member.recv().await.text, "sync");
    }

    #[tokio::test]
    async fn test_timestamp_is_assigned_by_the_server() {
        // テスト項目: クライアントが付けたタイムスタンプは配信時に上書きされる
        // given (前提条件):
        let (handle, _join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut bob = TestMember::join(&handle, "bob").await;
        let forged =
            ChatMessage::message("alice", "hi").stamped("1999-12-31T23:59:59Z".to_string());

        // when (操作):
        handle.publish(forged).await.unwrap();

        // then (期待する結果):
        let received = bob.recv().await;
        assert_eq!(received.timestamp, "2021-01-18T12:00:00Z");
        assert_eq!(received.kind, MessageKind::Message);
    }

    #[tokio::test]
    async fn test_timestamp_from_system_clock_is_rfc3339_utc() {
        // テスト項目: システム時計でのタイムスタンプは UTC の RFC 3339 形式になる
        // given (前提条件):
        let (handle, _join) = BroadcastCoordinator::spawn(Arc::new(SystemClock));
        let mut bob = TestMember::join(&handle, "bob").await;

        // when (操作):
        handle.publish(ChatMessage::announce("alice")).await.unwrap();

        // then (期待する結果):
        let received = bob.recv().await;
        assert!(received.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&received.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        // テスト項目: 二重の解除や未登録セッションの解除はエラーにならず、件数も変わらない
        // given (前提条件):
        let (handle, join) = BroadcastCoordinator::spawn(fixed_clock());
        let alice = TestMember::join(&handle, "alice").await;
        let bob = TestMember::join(&handle, "bob").await;

        // when (操作):
        let first = handle.unregister(alice.id).await;
        let second = handle.unregister(alice.id).await;
        let unknown = handle.unregister(SessionId::generate()).await;
        drop(handle);
        let registry = join.await.unwrap();

        // then (期待する結果):
        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert_eq!(unknown, Ok(()));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&bob.id));
        assert!(!registry.contains(&alice.id));
    }

    #[tokio::test]
    async fn test_unregistered_session_receives_nothing() {
        // テスト項目: 解除済みのセッションには配信されない
        // given (前提条件):
        let (handle, _join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut alice = TestMember::join(&handle, "alice").await;
        let mut bob = TestMember::join(&handle, "bob").await;
        handle.unregister(alice.id).await.unwrap();

        // when (操作):
        handle
            .publish(ChatMessage::message("carol", "anyone?"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(bob.recv().await.text, "anyone?");
        assert!(alice.peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failed_delivery_closes_and_evicts_recipient() {
        // テスト項目: 想定外の送信エラーが起きた接続は閉じられ、以降の配信対象から外れる
        // given (前提条件):
        let (handle, join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut mock = MockClientConnection::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Err(ConnectionError::Transport("broken pipe".to_string())));
        mock.expect_close().times(1).returning(|| ());
        let broken: Arc<dyn ClientConnection> = Arc::new(mock);
        let (_name_tx, name_rx) = watch::channel("dave".to_string());
        let broken_id = SessionId::generate();
        handle
            .register(RegisteredSession::new(broken_id, name_rx, &broken))
            .await
            .unwrap();
        let mut bob = TestMember::join(&handle, "bob").await;

        // when (操作):
        handle
            .publish(ChatMessage::message("alice", "first"))
            .await
            .unwrap();
        handle
            .publish(ChatMessage::message("alice", "second"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(bob.recv().await.text, "first");
        assert_eq!(bob.recv().await.text, "second");
        drop(handle);
        let registry = join.await.unwrap();
        assert!(!registry.contains(&broken_id));
        assert!(registry.contains(&bob.id));
    }

    #[tokio::test]
    async fn test_going_away_recipient_is_kept() {
        // テスト項目: going away による送信失敗では接続を閉じず、登録も維持される
        // given (前提条件):
        let (handle, join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut mock = MockClientConnection::new();
        mock.expect_send()
            .times(2)
            .returning(|_| Err(ConnectionError::Closed(Some(close_code::AWAY))));
        mock.expect_close().times(0);
        let leaving: Arc<dyn ClientConnection> = Arc::new(mock);
        let (_name_tx, name_rx) = watch::channel("erin".to_string());
        let leaving_id = SessionId::generate();
        handle
            .register(RegisteredSession::new(leaving_id, name_rx, &leaving))
            .await
            .unwrap();

        // when (操作):
        handle
            .publish(ChatMessage::message("alice", "one"))
            .await
            .unwrap();
        handle
            .publish(ChatMessage::message("alice", "two"))
            .await
            .unwrap();
        drop(handle);
        let registry = join.await.unwrap();

        // then (期待する結果):
        assert!(registry.contains(&leaving_id));
    }

    #[tokio::test]
    async fn test_dropped_connection_is_evicted() {
        // テスト項目: 接続が既に破棄されたセッションは配信時にレジストリから外れる
        // given (前提条件):
        let (handle, join) = BroadcastCoordinator::spawn(fixed_clock());
        let (connection, _inbound, _peer) = channel_connection();
        let connection: Arc<dyn ClientConnection> = connection;
        let (_name_tx, name_rx) = watch::channel("frank".to_string());
        let id = SessionId::generate();
        handle
            .register(RegisteredSession::new(id, name_rx, &connection))
            .await
            .unwrap();
        drop(connection);

        // when (操作):
        handle
            .publish(ChatMessage::message("alice", "hello"))
            .await
            .unwrap();
        drop(handle);
        let registry = join.await.unwrap();

        // then (期待する結果):
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_requests_fail_after_coordinator_stops() {
        // テスト項目: コーディネーター停止後の要求は Stopped エラーになる
        // given (前提条件):
        let (handle, join) = BroadcastCoordinator::spawn(fixed_clock());
        join.abort();
        let _ = join.await;

        // when (操作):
        let result = handle.publish(ChatMessage::message("alice", "hi")).await;

        // then (期待する結果):
        assert_eq!(result, Err(CoordinatorError::Stopped));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registry_is_consistent_under_concurrent_requests() {
        // テスト項目: 並行した登録・解除・配信の後、レジストリは「登録済みかつ未解除」の集合と一致する
        // given (前提条件):
        let (handle, join) = BroadcastCoordinator::spawn(fixed_clock());
        let mut tasks = Vec::new();

        // when (操作):
        for i in 0..64 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let (connection, _inbound, peer) = channel_connection();
                let connection: Arc<dyn ClientConnection> = connection;
                let (_name_tx, name_rx) = watch::channel(format!("user-{i}"));
                let id = SessionId::generate();
                handle
                    .register(RegisteredSession::new(id, name_rx, &connection))
                    .await
                    .unwrap();
                for n in 0..5 {
                    handle
                        .publish(ChatMessage::message(format!("user-{i}"), format!("msg {n}")))
                        .await
                        .unwrap();
                }
                let stays = i % 2 == 0;
                if !stays {
                    handle.unregister(id).await.unwrap();
                    handle.unregister(id).await.unwrap();
                }
                (id, stays, connection, peer)
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        drop(handle);
        let registry = join.await.unwrap();

        // then (期待する結果):
        let expected: Vec<SessionId> = results
            .iter()
            .filter(|(_, stays, _, _)| *stays)
            .map(|(id, _, _, _)| *id)
            .collect();
        assert_eq!(registry.len(), expected.len());
        for id in &expected {
            assert!(registry.contains(id));
        }
        let mut names = registry.names();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), expected.len());
    }
}
