//! Gateway wire format: JSON text frames exchanged over `/ws`.

use serde::{Deserialize, Serialize};

use crate::models::notification::Notification;

// ---------------------------------------------------------------------------
// Close codes
// ---------------------------------------------------------------------------

pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const CLOSE_AUTH_TIMEOUT: u16 = 4001;
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4002;

pub const REASON_USER_ID_REQUIRED: &str = "User ID required";
pub const AUTH_SUCCESS_MESSAGE: &str = "Authenticated successfully";

/// Inbound text frames larger than this are dropped unparsed.
pub const MAX_INBOUND_BYTES: usize = 64 * 1024;

/// Transport limit on a single inbound message. Anything larger fails the
/// read and ends the connection before it is buffered.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthSuccess { message: String },
    Notification { data: Notification },
}

impl ServerMessage {
    pub fn auth_success() -> Self {
        Self::AuthSuccess {
            message: AUTH_SUCCESS_MESSAGE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// The only client-originated message type. `user_id` is `None` when the
/// field is absent or not a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Auth { user_id: Option<String> },
}

#[derive(Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "userId", default)]
    user_id: Option<serde_json::Value>,
}

impl ClientMessage {
    /// Parse a text frame. Returns `None` for anything that is not a known
    /// message shape; callers ignore those frames.
    pub fn parse(text: &str) -> Option<Self> {
        if text.len() > MAX_INBOUND_BYTES {
            return None;
        }
        let raw: RawClientMessage = serde_json::from_str(text).ok()?;
        match raw.kind.as_str() {
            "auth" => Some(Self::Auth {
                user_id: raw
                    .user_id
                    .and_then(|v| v.as_str().map(str::to_string)),
            }),
            _ => None,
        }
    }
}
