//! Real-time push gateway served over `/ws`.

pub mod connection;
pub mod events;
pub mod heartbeat;
pub mod registry;
pub mod server;

use axum::routing::get;
use axum::Router;

use crate::AppState;

pub use connection::{ConnectionHandle, ConnectionId, ConnectionState, Outbound};
pub use registry::ConnectionRegistry;
pub use server::{GatewaySettings, GatewayStats, PushGateway};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(server::ws_upgrade))
        .route("/gateway/stats", get(server::stats))
}
