//! Notification inbox endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{notification::NotificationQuery, Notification},
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

#[derive(Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    /// Number of notifications that were unread
    pub updated: u64,
}

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(NotificationQuery),
    responses(
        (status = 200, description = "Caller's notifications", body = PaginatedResponse<Notification>)
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<PaginatedResponse<Notification>>> {
    let (notifications, total) = state
        .services
        .notifications
        .list_notifications(user.actor(), &query)
        .await?;
    Ok(Json(PaginatedResponse::new(notifications, total, query.page, query.per_page)))
}

#[utoipa::path(
    put,
    path = "/notifications/{id}/read",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_as_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    let notification = state.services.notifications.mark_as_read(user.actor(), id).await?;
    Ok(Json(notification))
}

#[utoipa::path(
    put,
    path = "/notifications/read-all",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All notifications marked as read", body = MarkAllReadResponse)
    )
)]
pub async fn mark_all_as_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<MarkAllReadResponse>> {
    let updated = state.services.notifications.mark_all_as_read(user.actor()).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
