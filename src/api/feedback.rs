//! Book feedback endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        feedback::{CreateFeedback, FeedbackQuery},
        Feedback,
    },
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

#[utoipa::path(
    post,
    path = "/feedback",
    tag = "feedback",
    security(("bearer_auth" = [])),
    request_body = CreateFeedback,
    responses(
        (status = 201, description = "Feedback created", body = Feedback),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(data): Json<CreateFeedback>,
) -> AppResult<(StatusCode, Json<Feedback>)> {
    let feedback = state.services.feedback.create_feedback(user.actor(), data).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

#[utoipa::path(
    get,
    path = "/feedback",
    tag = "feedback",
    security(("bearer_auth" = [])),
    params(FeedbackQuery),
    responses(
        (status = 200, description = "List of feedback", body = PaginatedResponse<Feedback>)
    )
)]
pub async fn list_feedback(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<FeedbackQuery>,
) -> AppResult<Json<PaginatedResponse<Feedback>>> {
    let (feedback, total) = state.services.feedback.list_feedback(&query).await?;
    Ok(Json(PaginatedResponse::new(feedback, total, query.page, query.per_page)))
}

#[utoipa::path(
    get,
    path = "/feedback/{id}",
    tag = "feedback",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Feedback ID")
    ),
    responses(
        (status = 200, description = "Feedback details", body = Feedback),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Feedback not found")
    )
)]
pub async fn get_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Feedback>> {
    let feedback = state.services.feedback.get_feedback(user.actor(), id).await?;
    Ok(Json(feedback))
}

#[utoipa::path(
    delete,
    path = "/feedback/{id}",
    tag = "feedback",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Feedback ID")
    ),
    responses(
        (status = 204, description = "Feedback deleted"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Feedback not found")
    )
)]
pub async fn delete_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.feedback.delete_feedback(user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
