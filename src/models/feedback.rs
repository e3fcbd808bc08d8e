//! Reader feedback on books

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub title: String,
    pub comment: String,
    pub rating: i16,
    pub created_at: DateTime<Utc>,
}

/// Create feedback request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedback {
    pub book_id: Uuid,
    #[validate(length(min = 5, message = "Title must be at least 5 characters"))]
    pub title: String,
    #[validate(length(min = 10, message = "Comment must be at least 10 characters"))]
    pub comment: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
}

/// Feedback query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackQuery {
    pub book_id: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
