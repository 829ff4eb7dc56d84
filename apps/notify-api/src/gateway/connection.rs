//! Per-connection state: the outbound handle stored in the registry and the
//! `PendingAuth -> Authenticated -> Closed` state machine that drives it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use steeple_common::id::{prefix, prefixed_ulid};
use tokio::sync::{mpsc, Notify};

use super::events::{ClientMessage, ServerMessage, CLOSE_POLICY_VIOLATION, REASON_USER_ID_REQUIRED};
use super::registry::ConnectionRegistry;

/// Unique connection identifier (`conn_` prefixed ULID).
pub type ConnectionId = String;

/// A frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close { code: u16, reason: &'static str },
}

/// Outbound half of an authenticated connection.
///
/// Holds the sender for the connection's bounded writer queue plus the
/// liveness flag flipped by the heartbeat sweep.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: String,
    sender: mpsc::Sender<Outbound>,
    alive: AtomicBool,
    terminated: AtomicBool,
    terminate_signal: Notify,
}

impl ConnectionHandle {
    pub fn new(user_id: &str, sender: mpsc::Sender<Outbound>) -> Arc<Self> {
        Self::with_id(prefixed_ulid(prefix::CONNECTION), user_id, sender)
    }

    pub fn with_id(id: ConnectionId, user_id: &str, sender: mpsc::Sender<Outbound>) -> Arc<Self> {
        Arc::new(Self {
            id,
            user_id: user_id.to_string(),
            sender,
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            terminate_signal: Notify::new(),
        })
    }

    /// Whether frames can still be queued on this connection.
    pub fn is_open(&self) -> bool {
        !self.is_terminated() && !self.sender.is_closed()
    }

    /// Queue a frame without waiting. Returns `false` when the connection is
    /// closed or its queue is full; the frame is dropped in both cases.
    pub fn try_send(&self, frame: Outbound) -> bool {
        if self.is_terminated() {
            return false;
        }
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(conn_id = %self.id, "outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Record a pong.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Clear the liveness flag, returning whether it was set.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Ask the connection's lifecycle task to shut the socket down.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            self.terminate_signal.notify_one();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Resolves once [`terminate`](Self::terminate) has been called.
    pub async fn terminated(&self) {
        if self.is_terminated() {
            return;
        }
        self.terminate_signal.notified().await;
    }
}

/// Connection lifecycle state. Only `Authenticated` carries a registered
/// handle, so nothing can be pushed to a pending or closed connection.
#[derive(Debug)]
pub enum ConnectionState {
    PendingAuth,
    Authenticated(Arc<ConnectionHandle>),
    Closed,
}

/// Result of feeding one inbound text frame to a [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Unknown, malformed, or redundant frame; state unchanged.
    Ignored,
    /// Auth accepted: ack queued and handle registered.
    Authenticated,
    /// Auth refused; the socket must be closed with this code.
    Rejected { code: u16, reason: &'static str },
}

/// Protocol state machine for one socket, independent of the socket itself.
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
    registry: Arc<ConnectionRegistry>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        sender: mpsc::Sender<Outbound>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            id,
            sender,
            registry,
            state: ConnectionState::PendingAuth,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ConnectionState::PendingAuth)
    }

    /// The registered handle, once authenticated.
    pub fn handle(&self) -> Option<Arc<ConnectionHandle>> {
        match &self.state {
            ConnectionState::Authenticated(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn handle_text(&mut self, text: &str) -> Transition {
        let Some(ClientMessage::Auth { user_id }) = ClientMessage::parse(text) else {
            tracing::trace!(conn_id = %self.id, "ignoring unrecognised frame");
            return Transition::Ignored;
        };

        match &self.state {
            ConnectionState::PendingAuth => {}
            ConnectionState::Authenticated(handle) => {
                tracing::debug!(conn_id = %self.id, user_id = %handle.user_id, "ignoring repeated auth");
                return Transition::Ignored;
            }
            ConnectionState::Closed => return Transition::Ignored,
        }

        let user_id = match user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                tracing::debug!(conn_id = %self.id, "auth without user id");
                self.state = ConnectionState::Closed;
                return Transition::Rejected {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: REASON_USER_ID_REQUIRED,
                };
            }
        };

        // The ack goes on the FIFO queue before the handle becomes visible to
        // deliveries, so it always precedes the first push.
        let ack = match serde_json::to_string(&ServerMessage::auth_success()) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(?err, "failed to serialize auth ack");
                self.state = ConnectionState::Closed;
                return Transition::Ignored;
            }
        };
        if self.sender.try_send(Outbound::Text(ack)).is_err() {
            self.state = ConnectionState::Closed;
            return Transition::Ignored;
        }

        let handle = ConnectionHandle::with_id(self.id.clone(), &user_id, self.sender.clone());
        self.registry.add(&user_id, handle.clone());
        self.state = ConnectionState::Authenticated(handle);

        tracing::info!(conn_id = %self.id, user_id = %user_id, "gateway connection authenticated");
        Transition::Authenticated
    }

    pub fn record_pong(&self) {
        if let ConnectionState::Authenticated(handle) = &self.state {
            handle.mark_alive();
        }
    }

    /// Move to `Closed` from any state, deregistering if needed.
    pub fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);
        if let ConnectionState::Authenticated(handle) = previous {
            handle.terminate();
            self.registry.remove(&handle.user_id, &handle.id);
            tracing::info!(conn_id = %self.id, user_id = %handle.user_id, "gateway connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Connection, mpsc::Receiver<Outbound>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        let conn = Connection::new("conn_test".into(), tx, registry.clone());
        (conn, rx, registry)
    }

    #[test]
    fn auth_registers_and_queues_ack() {
        let (mut conn, mut rx, registry) = connection();

        let t = conn.handle_text(r#"{"type":"auth","userId":"usr_a"}"#);
        assert_eq!(t, Transition::Authenticated);
        assert!(matches!(conn.state(), ConnectionState::Authenticated(_)));
        assert_eq!(registry.get("usr_a").len(), 1);

        match rx.try_recv().unwrap() {
            Outbound::Text(json) => {
                let msg: ServerMessage = serde_json::from_str(&json).unwrap();
                assert_eq!(msg, ServerMessage::auth_success());
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn blank_user_id_is_rejected_without_registering() {
        for frame in [
            r#"{"type":"auth"}"#,
            r#"{"type":"auth","userId":""}"#,
            r#"{"type":"auth","userId":"   "}"#,
        ] {
            let (mut conn, mut rx, registry) = connection();
            assert_eq!(
                conn.handle_text(frame),
                Transition::Rejected {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: REASON_USER_ID_REQUIRED,
                }
            );
            assert!(matches!(conn.state(), ConnectionState::Closed));
            assert_eq!(registry.connection_count(), 0);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn garbage_is_ignored_in_every_state() {
        let (mut conn, _rx, registry) = connection();
        assert_eq!(conn.handle_text("{oops"), Transition::Ignored);
        assert!(conn.is_pending());

        conn.handle_text(r#"{"type":"auth","userId":"usr_a"}"#);
        assert_eq!(conn.handle_text(r#"{"type":"ping"}"#), Transition::Ignored);
        assert_eq!(
            conn.handle_text(r#"{"type":"auth","userId":"usr_b"}"#),
            Transition::Ignored
        );
        assert!(registry.contains_user("usr_a"));
        assert!(!registry.contains_user("usr_b"));
    }

    #[test]
    fn close_deregisters_and_terminates() {
        let (mut conn, _rx, registry) = connection();
        conn.handle_text(r#"{"type":"auth","userId":"usr_a"}"#);
        let handle = conn.handle().unwrap();

        conn.close();
        assert!(matches!(conn.state(), ConnectionState::Closed));
        assert!(!registry.contains_user("usr_a"));
        assert!(handle.is_terminated());
        assert!(!handle.try_send(Outbound::Ping));

        // Closing twice is harmless.
        conn.close();
    }

    #[test]
    fn drop_deregisters() {
        let (mut conn, _rx, registry) = connection();
        conn.handle_text(r#"{"type":"auth","userId":"usr_a"}"#);
        drop(conn);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn take_alive_clears_flag_until_pong() {
        let (mut conn, _rx, _registry) = connection();
        conn.handle_text(r#"{"type":"auth","userId":"usr_a"}"#);
        let handle = conn.handle().unwrap();

        assert!(handle.take_alive());
        assert!(!handle.take_alive());
        conn.record_pong();
        assert!(handle.is_alive());
    }
}
