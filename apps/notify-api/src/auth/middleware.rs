//! Caller identity extraction.
//!
//! Sessions are resolved by the upstream web tier, which forwards the caller
//! as the `X-User-Id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user extracted from the `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Rejection returned when the identity header is missing or blank.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(AuthError {
                message: "Missing X-User-Id header",
            })?
            .to_str()
            .map_err(|_| AuthError {
                message: "Invalid X-User-Id header",
            })?;

        let user_id = header.trim();
        if user_id.is_empty() {
            return Err(AuthError {
                message: "Invalid X-User-Id header",
            });
        }

        Ok(AuthUser {
            user_id: user_id.to_string(),
        })
    }
}
