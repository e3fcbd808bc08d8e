//! Borrowing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        borrowing::{BorrowingQuery, CreateBorrowing, ExtendDeadline, ReturnBook},
        Borrowing,
    },
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Borrow a book, individually or for a group
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowing,
    responses(
        (status = 201, description = "Borrowing created", body = Borrowing),
        (status = 400, description = "No copies available, limit reached or invalid group"),
        (status = 403, description = "Only the group leader can borrow"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_borrowing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(data): Json<CreateBorrowing>,
) -> AppResult<(StatusCode, Json<Borrowing>)> {
    let borrowing = state.services.borrowings.create_borrowing(user.actor(), data).await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// List borrowings visible to the caller
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingQuery),
    responses(
        (status = 200, description = "List of borrowings", body = PaginatedResponse<Borrowing>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_borrowings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<PaginatedResponse<Borrowing>>> {
    let (borrowings, total) = state.services.borrowings.list_borrowings(user.actor(), &query).await?;
    Ok(Json(PaginatedResponse::new(borrowings, total, query.page, query.per_page)))
}

/// Get borrowing details by ID
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing details", body = Borrowing),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Borrowing>> {
    let borrowing = state.services.borrowings.get_borrowing(user.actor(), id).await?;
    Ok(Json(borrowing))
}

/// Return a borrowed book, optionally reporting damage
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    request_body = ReturnBook,
    responses(
        (status = 200, description = "Book returned", body = Borrowing),
        (status = 400, description = "Already returned or lost"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ReturnBook>>,
) -> AppResult<Json<Borrowing>> {
    let damage = body.and_then(|Json(b)| b.damage_level);
    let borrowing = state.services.borrowings.return_book(user.actor(), id, damage).await?;
    Ok(Json(borrowing))
}

/// Move the due date of an active borrowing (admin)
#[utoipa::path(
    put,
    path = "/borrowings/{id}/extend",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    request_body = ExtendDeadline,
    responses(
        (status = 200, description = "Deadline extended", body = Borrowing),
        (status = 400, description = "Not active or date not later"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn extend_deadline(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(data): Json<ExtendDeadline>,
) -> AppResult<Json<Borrowing>> {
    let borrowing = state
        .services
        .borrowings
        .extend_deadline(user.actor(), id, data.new_due_date)
        .await?;
    Ok(Json(borrowing))
}

/// Declare a borrowed copy lost (admin)
#[utoipa::path(
    post,
    path = "/borrowings/{id}/lost",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Book marked as lost", body = Borrowing),
        (status = 400, description = "Already returned or lost"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn mark_as_lost(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Borrowing>> {
    let borrowing = state.services.borrowings.mark_as_lost(user.actor(), id).await?;
    Ok(Json(borrowing))
}
