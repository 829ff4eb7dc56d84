//! Push gateway: WebSocket upgrade, per-connection lifecycle and writer
//! tasks, and delivery into the registry.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use steeple_common::id::{prefix, prefixed_ulid};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use utoipa::ToSchema;

use crate::config::Config;
use crate::models::notification::Notification;
use crate::AppState;

use super::connection::{Connection, ConnectionHandle, Outbound, Transition};
use super::events::{
    ServerMessage, CLOSE_AUTH_TIMEOUT, CLOSE_GOING_AWAY, CLOSE_HEARTBEAT_TIMEOUT,
    MAX_FRAME_BYTES,
};
use super::heartbeat::{self, SweepReport};
use super::registry::ConnectionRegistry;

/// Timing and buffering knobs for the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    pub heartbeat_interval: Duration,
    pub auth_timeout: Duration,
    pub send_timeout: Duration,
    pub outbound_buffer: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
        }
    }
}

impl From<&Config> for GatewaySettings {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            auth_timeout: config.auth_timeout,
            send_timeout: config.send_timeout,
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }
}

/// Why the lifecycle loop ended, and which close frame (if any) to send.
type CloseReason = Option<(u16, &'static str)>;

/// Cheaply cloneable handle to the process-wide gateway.
#[derive(Clone)]
pub struct PushGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    registry: Arc<ConnectionRegistry>,
    settings: GatewaySettings,
    shutdown: watch::Sender<bool>,
}

impl PushGateway {
    pub fn new(registry: Arc<ConnectionRegistry>, settings: GatewaySettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(GatewayInner {
                registry,
                settings,
                shutdown,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.inner.settings
    }

    /// Queue `notification` on every open connection of `user_id`.
    ///
    /// Never blocks: closed connections and full queues are skipped. Returns
    /// how many connections the payload was queued on.
    pub fn deliver_to_user(&self, user_id: &str, notification: &Notification) -> usize {
        let handles = self.inner.registry.get(user_id);
        if handles.is_empty() {
            return 0;
        }

        let payload = ServerMessage::Notification {
            data: notification.clone(),
        };
        let json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(?err, notification_id = %notification.id, "failed to serialize push");
                return 0;
            }
        };

        let mut delivered = 0;
        for handle in handles {
            if !handle.is_open() {
                continue;
            }
            if handle.try_send(Outbound::Text(json.clone())) {
                delivered += 1;
            } else {
                tracing::debug!(conn_id = %handle.id, user_id, "push skipped");
            }
        }
        delivered
    }

    /// Run one heartbeat sweep now.
    pub fn sweep(&self) -> SweepReport {
        heartbeat::sweep(&self.inner.registry)
    }

    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        heartbeat::spawn(
            self.inner.registry.clone(),
            self.inner.settings.heartbeat_interval,
            self.inner.shutdown.subscribe(),
        )
    }

    /// Close every connection with 1001 and stop the heartbeat task.
    pub fn shutdown(&self) {
        tracing::info!(
            connections = self.inner.registry.connection_count(),
            "gateway shutting down"
        );
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Drive one upgraded socket until it closes.
    pub async fn serve_socket(&self, socket: WebSocket) {
        let settings = self.inner.settings;
        let conn_id = prefixed_ulid(prefix::CONNECTION);
        let (ws_tx, mut ws_rx) = socket.split();
        let (out_tx, out_rx) = mpsc::channel(settings.outbound_buffer);

        let mut writer = tokio::spawn(write_loop(
            ws_tx,
            out_rx,
            settings.send_timeout,
            conn_id.clone(),
        ));

        let mut conn = Connection::new(conn_id.clone(), out_tx.clone(), self.inner.registry.clone());
        let mut shutdown = self.inner.shutdown.subscribe();
        let auth_deadline = time::sleep(settings.auth_timeout);
        tokio::pin!(auth_deadline);

        tracing::debug!(conn_id = %conn_id, "gateway connection opened");

        let close: CloseReason = if *shutdown.borrow_and_update() {
            Some((CLOSE_GOING_AWAY, "Server shutting down"))
        } else {
            loop {
                let handle = conn.handle();
                tokio::select! {
                    msg = ws_rx.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Transition::Rejected { code, reason } = conn.handle_text(text.as_str()) {
                                break Some((code, reason));
                            }
                        }
                        Some(Ok(Message::Pong(_))) => conn.record_pong(),
                        Some(Ok(Message::Close(_))) | None => break None,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::debug!(?err, conn_id = %conn_id, "ws read error");
                            break None;
                        }
                    },

                    _ = &mut auth_deadline, if conn.is_pending() => {
                        tracing::debug!(conn_id = %conn_id, "auth timeout");
                        break Some((CLOSE_AUTH_TIMEOUT, "Authentication timeout"));
                    }

                    _ = wait_terminated(handle) => {
                        break Some((CLOSE_HEARTBEAT_TIMEOUT, "Heartbeat timeout"));
                    }

                    _ = out_tx.closed() => break None,

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break Some((CLOSE_GOING_AWAY, "Server shutting down"));
                        }
                    }
                }
            }
        };

        conn.close();
        drop(conn);

        if let Some((code, reason)) = close {
            let _ = time::timeout(
                settings.send_timeout,
                out_tx.send(Outbound::Close { code, reason }),
            )
            .await;
        }
        drop(out_tx);

        if time::timeout(settings.send_timeout, &mut writer).await.is_err() {
            writer.abort();
        }
        tracing::debug!(conn_id = %conn_id, "gateway connection finished");
    }
}

async fn wait_terminated(handle: Option<Arc<ConnectionHandle>>) {
    match handle {
        Some(handle) => handle.terminated().await,
        None => std::future::pending().await,
    }
}

/// Drain the outbound queue onto the socket, one frame at a time.
///
/// A write that exceeds `send_timeout` or fails ends the task, which closes
/// the queue and lets the lifecycle task tear the connection down.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    send_timeout: Duration,
    conn_id: String,
) {
    while let Some(frame) = rx.recv().await {
        let is_close = matches!(frame, Outbound::Close { .. });
        let msg = match frame {
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Ping => Message::Ping(Default::default()),
            Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })),
        };

        match time::timeout(send_timeout, ws_tx.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(?err, conn_id = %conn_id, "ws write error");
                break;
            }
            Err(_) => {
                tracing::warn!(conn_id = %conn_id, "ws write timed out");
                break;
            }
        }

        if is_close {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(super) async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let gateway = state.gateway.clone();
    ws.max_message_size(MAX_FRAME_BYTES)
        .max_frame_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| async move { gateway.serve_socket(socket).await })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayStats {
    /// Users with at least one authenticated connection.
    pub users: usize,
    pub connections: usize,
}

#[utoipa::path(
    get,
    path = "/gateway/stats",
    tag = "Gateway",
    responses(
        (status = 200, description = "Live connection counts", body = GatewayStats),
    )
)]
pub async fn stats(State(state): State<AppState>) -> Json<GatewayStats> {
    let registry = state.gateway.registry();
    Json(GatewayStats {
        users: registry.user_count(),
        connections: registry.connection_count(),
    })
}
