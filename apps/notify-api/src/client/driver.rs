//! Tokio driver for [`DeliverySession`]: speaks the gateway protocol over
//! tokio-tungstenite and lists notifications over HTTP with reqwest.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::auth::USER_ID_HEADER;
use crate::gateway::events::ServerMessage;
use crate::routes::notifications::ListNotificationsResponse;

use super::session::{Command, DeliverySession, SessionState};
use super::{ClientConfig, ClientError, ClientEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Turn the HTTP base URL into the gateway URL.
pub fn ws_url(server_url: &str) -> Result<String, ClientError> {
    let base = server_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(ClientError::InvalidUrl(server_url.to_string()));
    };
    Ok(format!("{rest}/ws"))
}

/// Open the socket, authenticate, and wait for the ack.
///
/// `auth_timeout` bounds the whole exchange, TCP and upgrade included.
pub async fn connect(config: &ClientConfig) -> Result<Socket, ClientError> {
    let url = ws_url(&config.server_url)?;
    time::timeout(config.auth_timeout, handshake(&url, &config.user_id))
        .await
        .map_err(|_| ClientError::AuthTimeout)?
}

async fn handshake(url: &str, user_id: &str) -> Result<Socket, ClientError> {
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await?;

    let auth = serde_json::json!({ "type": "auth", "userId": user_id });
    socket.send(Message::Text(auth.to_string().into())).await?;

    while let Some(msg) = socket.next().await {
        match msg? {
            Message::Text(text) => {
                if let Ok(ServerMessage::AuthSuccess { .. }) =
                    serde_json::from_str::<ServerMessage>(text.as_str())
                {
                    return Ok(socket);
                }
            }
            Message::Close(_) => return Err(ClientError::AuthRejected),
            _ => {}
        }
    }
    Err(ClientError::AuthRejected)
}

/// `GET /notifications` as `config.user_id`.
pub async fn fetch_list(
    http: &reqwest::Client,
    config: &ClientConfig,
) -> Result<ListNotificationsResponse, ClientError> {
    let url = format!("{}/notifications", config.server_url.trim_end_matches('/'));
    let resp = http
        .get(url)
        .header(USER_ID_HEADER, &config.user_id)
        .query(&[("limit", config.list_limit)])
        .send()
        .await?
        .error_for_status()?;
    Ok(resp.json().await?)
}

/// Run the session until the event receiver is dropped.
pub async fn run(config: ClientConfig, events: mpsc::Sender<ClientEvent>) -> Result<(), ClientError> {
    let http = reqwest::Client::new();
    let mut session = DeliverySession::new(config.policy.clone(), config.muted);
    let mut pending: VecDeque<Command> = session.start().into();

    let mut socket: Option<Socket> = None;
    let mut reconnect_at: Option<Instant> = None;
    let mut poll: Option<Interval> = None;
    let mut recovery: Option<Interval> = None;
    let mut reported: Option<SessionState> = None;

    loop {
        loop {
            if !report_state(&session, &mut reported, &events).await {
                return Ok(());
            }
            let Some(command) = pending.pop_front() else {
                break;
            };
            match command {
                Command::Connect => match connect(&config).await {
                    Ok(ws) => {
                        tracing::info!(user_id = %config.user_id, "push channel connected");
                        socket = Some(ws);
                        pending.extend(session.on_connected());
                    }
                    Err(err) => {
                        tracing::debug!(%err, "connect failed");
                        pending.extend(session.on_connect_failed());
                    }
                },
                Command::ScheduleReconnect(delay) => {
                    tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                    reconnect_at = Some(Instant::now() + delay);
                }
                Command::FetchList => match fetch_list(&http, &config).await {
                    Ok(resp) => {
                        pending.extend(session.on_list(&resp.notifications));
                        let event = ClientEvent::Notifications {
                            notifications: resp.notifications,
                            unread_count: resp.unread_count,
                        };
                        if events.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(err) => tracing::warn!(%err, "failed to fetch notifications"),
                },
                Command::StartPolling(every) => {
                    tracing::info!(every_secs = every.as_secs(), "push channel unavailable, polling");
                    poll = Some(interval(every));
                    recovery = config.push_retry_while_polling.map(|every| {
                        let mut recovery = time::interval_at(Instant::now() + every, every);
                        recovery.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        recovery
                    });
                }
                Command::StopPolling => {
                    poll = None;
                    recovery = None;
                }
                Command::Toast(notification) => {
                    if events.send(ClientEvent::Toast(notification)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        tokio::select! {
            msg = next_message(&mut socket) => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(ServerMessage::Notification { data }) =
                        serde_json::from_str::<ServerMessage>(text.as_str())
                    {
                        if events.send(ClientEvent::Pushed(data.clone())).await.is_err() {
                            return Ok(());
                        }
                        pending.extend(session.on_push(data));
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::info!(user_id = %config.user_id, "push channel lost");
                    socket = None;
                    pending.extend(session.on_connection_lost());
                }
                Some(Ok(_)) => {}
            },

            _ = sleep_until(reconnect_at) => {
                reconnect_at = None;
                pending.extend(session.on_reconnect_timer());
            }

            _ = tick(&mut poll) => pending.extend(session.on_poll_timer()),

            _ = tick(&mut recovery) => pending.extend(session.on_recovery_timer()),

            _ = events.closed() => return Ok(()),
        }
    }
}

/// Emit `StateChanged` if the session moved since the last report. Returns
/// `false` once nobody is listening.
async fn report_state(
    session: &DeliverySession,
    reported: &mut Option<SessionState>,
    events: &mpsc::Sender<ClientEvent>,
) -> bool {
    if *reported == Some(session.state()) {
        return true;
    }
    *reported = Some(session.state());
    let event = ClientEvent::StateChanged {
        state: session.state(),
        status: session.status(),
    };
    events.send(event).await.is_ok()
}

fn interval(every: Duration) -> Interval {
    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_message(
    socket: &mut Option<Socket>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_maps_schemes() {
        assert_eq!(ws_url("http://localhost:4003").unwrap(), "ws://localhost:4003/ws");
        assert_eq!(ws_url("https://notify.example.org/").unwrap(), "wss://notify.example.org/ws");
        assert_eq!(ws_url("ws://127.0.0.1:9").unwrap(), "ws://127.0.0.1:9/ws");
        assert!(matches!(ws_url("localhost:4003"), Err(ClientError::InvalidUrl(_))));
    }
}
