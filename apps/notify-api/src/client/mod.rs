//! Client side of notification delivery: keeps a push channel open when it
//! can, polls when it cannot, and decides which notifications to toast.
//!
//! [`session`] holds the decisions and [`driver`] performs the I/O.

pub mod backoff;
pub mod driver;
pub mod prefs;
pub mod session;
pub mod toast;

use std::time::Duration;

use crate::models::notification::Notification;

pub use backoff::ReconnectPolicy;
pub use prefs::ClientPreferences;
pub use session::{Command, DeliverySession, SessionState, Status};
pub use toast::ToastFilter;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("server closed the connection during auth")]
    AuthRejected,
    #[error("timed out connecting or waiting for auth acknowledgement")]
    AuthTimeout,
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP URL of the notify API, e.g. `http://localhost:4003`.
    pub server_url: String,
    pub user_id: String,
    pub policy: ReconnectPolicy,
    /// When set, keep probing the push channel at this interval while
    /// polling and switch back on success. Off by default.
    pub push_retry_while_polling: Option<Duration>,
    /// How long to wait for `auth_success` after connecting.
    pub auth_timeout: Duration,
    pub list_limit: i64,
    pub muted: bool,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            user_id: user_id.into(),
            policy: ReconnectPolicy::default(),
            push_retry_while_polling: None,
            auth_timeout: Duration::from_secs(10),
            list_limit: 50,
            muted: false,
        }
    }
}

/// What the driver reports to its owner.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged { state: SessionState, status: Status },
    /// Result of a list fetch.
    Notifications {
        notifications: Vec<Notification>,
        unread_count: i64,
    },
    Pushed(Notification),
    Toast(Notification),
}
