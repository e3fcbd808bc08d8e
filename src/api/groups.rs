//! Borrowing group endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        group::{CreateGroup, GroupQuery, UpdateGroup},
        Group,
    },
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Create a group led by the caller
#[utoipa::path(
    post,
    path = "/groups",
    tag = "groups",
    security(("bearer_auth" = [])),
    request_body = CreateGroup,
    responses(
        (status = 201, description = "Group created (pending approval)", body = Group),
        (status = 400, description = "Invalid size or member IDs"),
        (status = 409, description = "Group name already exists")
    )
)]
pub async fn create_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(data): Json<CreateGroup>,
) -> AppResult<(StatusCode, Json<Group>)> {
    let group = state.services.groups.create_group(user.actor(), data).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/groups",
    tag = "groups",
    security(("bearer_auth" = [])),
    params(GroupQuery),
    responses(
        (status = 200, description = "List of groups", body = PaginatedResponse<Group>)
    )
)]
pub async fn list_groups(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<GroupQuery>,
) -> AppResult<Json<PaginatedResponse<Group>>> {
    let (groups, total) = state.services.groups.list_groups(user.actor(), &query).await?;
    Ok(Json(PaginatedResponse::new(groups, total, query.page, query.per_page)))
}

#[utoipa::path(
    get,
    path = "/groups/{id}",
    tag = "groups",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Group ID")
    ),
    responses(
        (status = 200, description = "Group details", body = Group),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn get_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Group>> {
    let group = state.services.groups.get_group(user.actor(), id).await?;
    Ok(Json(group))
}

/// Rename a group or replace its members (leader or admin)
#[utoipa::path(
    put,
    path = "/groups/{id}",
    tag = "groups",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Group ID")
    ),
    request_body = UpdateGroup,
    responses(
        (status = 200, description = "Group updated", body = Group),
        (status = 403, description = "Only leader or admin can update"),
        (status = 409, description = "Group name already exists")
    )
)]
pub async fn update_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateGroup>,
) -> AppResult<Json<Group>> {
    let group = state.services.groups.update_group(user.actor(), id, data).await?;
    Ok(Json(group))
}

#[utoipa::path(
    post,
    path = "/groups/{id}/approve",
    tag = "groups",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Group ID")
    ),
    responses(
        (status = 200, description = "Group approved", body = Group),
        (status = 400, description = "Group is not pending"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn approve_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Group>> {
    let group = state.services.groups.approve_group(user.actor(), id).await?;
    Ok(Json(group))
}

#[utoipa::path(
    post,
    path = "/groups/{id}/reject",
    tag = "groups",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Group ID")
    ),
    responses(
        (status = 200, description = "Group rejected", body = Group),
        (status = 400, description = "Group is not pending"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn reject_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Group>> {
    let group = state.services.groups.reject_group(user.actor(), id).await?;
    Ok(Json(group))
}

/// Dissolve a group (admin)
#[utoipa::path(
    delete,
    path = "/groups/{id}",
    tag = "groups",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Group ID")
    ),
    responses(
        (status = 204, description = "Group dissolved"),
        (status = 400, description = "Group has an active borrowing"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn dissolve_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.groups.dissolve_group(user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
