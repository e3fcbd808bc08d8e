//! Fine endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        fine::{FineQuery, UpdateFine},
        Fine,
    },
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// List fines: all for admins, the caller's own otherwise
#[utoipa::path(
    get,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(FineQuery),
    responses(
        (status = 200, description = "List of fines", body = PaginatedResponse<Fine>)
    )
)]
pub async fn list_fines(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<FineQuery>,
) -> AppResult<Json<PaginatedResponse<Fine>>> {
    let (fines, total) = state.services.fines.list_fines(user.actor(), &query).await?;
    Ok(Json(PaginatedResponse::new(fines, total, query.page, query.per_page)))
}

#[utoipa::path(
    get,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine details", body = Fine),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn get_fine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.get_fine(user.actor(), id).await?;
    Ok(Json(fine))
}

/// Pay a fine in full
#[utoipa::path(
    post,
    path = "/fines/{id}/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine paid", body = Fine),
        (status = 400, description = "Fine already settled"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn pay_fine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.pay_fine(user.actor(), id).await?;
    Ok(Json(fine))
}

/// Waive a fine (admin)
#[utoipa::path(
    post,
    path = "/fines/{id}/waive",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine waived", body = Fine),
        (status = 400, description = "Fine already settled"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn waive_fine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.waive_fine(user.actor(), id).await?;
    Ok(Json(fine))
}

/// Adjust fine components (admin)
#[utoipa::path(
    put,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Fine ID")
    ),
    request_body = UpdateFine,
    responses(
        (status = 200, description = "Fine updated", body = Fine),
        (status = 400, description = "Fine already settled or negative amount"),
        (status = 403, description = "Administrator privileges required"),
        (status = 409, description = "Fine was modified concurrently")
    )
)]
pub async fn update_fine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateFine>,
) -> AppResult<Json<Fine>> {
    let fine = state.services.fines.update_fine(user.actor(), id, data).await?;
    Ok(Json(fine))
}
