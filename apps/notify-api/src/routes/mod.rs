pub mod health;
pub mod notifications;

use axum::Router;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::router())
        .merge(notifications::router())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-User-Id"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Notifications
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        notifications::delete_notification,
        notifications::dispatch,
        // Gateway
        crate::gateway::server::stats,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::notification::Notification,
            crate::models::notification::NotificationType,
            // Route request/response types
            health::HealthResponse,
            notifications::ListNotificationsResponse,
            notifications::MarkAllReadResponse,
            notifications::DispatchRequest,
            notifications::DispatchResponse,
            crate::gateway::GatewayStats,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Notifications", description = "Notification inbox"),
        (name = "Gateway", description = "Real-time push gateway"),
    )
)]
pub struct ApiDoc;
