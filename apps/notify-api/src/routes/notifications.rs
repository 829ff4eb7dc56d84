//! Notification inbox endpoints and the dispatch hook.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthUser;
use crate::dispatch::requested_count;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::notification::{Notification, NotificationDraft, NotificationType};
use crate::AppState;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", patch(mark_all_read))
        .route("/notifications/dispatch", post(dispatch))
        .route("/notifications/{id}/read", patch(mark_read))
        .route("/notifications/{id}", delete(delete_notification))
}

// ---------------------------------------------------------------------------
// GET /notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListNotificationsQuery {
    /// Number of notifications to return (1-100, default 50).
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Notifications",
    security(("user_id" = [])),
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Newest notifications first", body = ListNotificationsResponse),
        (status = 401, description = "Missing identity", body = ApiErrorBody),
    )
)]
pub async fn list_notifications(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListNotificationsQuery>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let notifications = state.store.list_for_user(&user_id, limit).await?;
    let unread_count = state.store.unread_count(&user_id).await?;

    Ok(Json(ListNotificationsResponse {
        notifications,
        unread_count,
    }))
}

// ---------------------------------------------------------------------------
// PATCH /notifications/{id}/read
// ---------------------------------------------------------------------------

#[utoipa::path(
    patch,
    path = "/notifications/{id}/read",
    tag = "Notifications",
    security(("user_id" = [])),
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 403, description = "Owned by another user", body = ApiErrorBody),
        (status = 404, description = "Notification not found", body = ApiErrorBody),
    )
)]
pub async fn mark_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.mark_read(&user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// PATCH /notifications/read-all
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

#[utoipa::path(
    patch,
    path = "/notifications/read-all",
    tag = "Notifications",
    security(("user_id" = [])),
    responses(
        (status = 200, description = "Unread notifications marked as read", body = MarkAllReadResponse),
        (status = 401, description = "Missing identity", body = ApiErrorBody),
    )
)]
pub async fn mark_all_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = state.store.mark_all_read(&user_id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

// ---------------------------------------------------------------------------
// DELETE /notifications/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "Notifications",
    security(("user_id" = [])),
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Owned by another user", body = ApiErrorBody),
        (status = 404, description = "Notification not found", body = ApiErrorBody),
    )
)]
pub async fn delete_notification(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /notifications/dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub user_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DispatchResponse {
    /// One record per user that was notified; users whose write failed are
    /// absent. When every write fails the request fails with 500.
    pub notifications: Vec<Notification>,
}

#[utoipa::path(
    post,
    path = "/notifications/dispatch",
    tag = "Notifications",
    request_body = DispatchRequest,
    responses(
        (status = 201, description = "Notifications persisted and pushed", body = DispatchResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 500, description = "No notification could be persisted", body = ApiErrorBody),
    )
)]
pub async fn dispatch(
    State(state): State<AppState>,
    Json(body): Json<DispatchRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>), ApiError> {
    let title = body.title.trim();
    let message = body.message.trim();

    let mut errors = Vec::new();
    if requested_count(&body.user_ids) == 0 {
        errors.push(FieldError::new("userIds", "At least one user id is required"));
    }
    if title.is_empty() {
        errors.push(FieldError::new("title", "Title is required"));
    }
    if message.is_empty() {
        errors.push(FieldError::new("message", "Message is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let mut draft = NotificationDraft::new(body.kind, title, message);
    if let Some(link) = body.link.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        draft = draft.with_link(link);
    }

    let notifications = state.dispatcher.notify_many(body.user_ids.as_slice(), &draft).await;
    if notifications.is_empty() {
        return Err(ApiError::internal("No notification could be created"));
    }
    Ok((StatusCode::CREATED, Json(DispatchResponse { notifications })))
}
