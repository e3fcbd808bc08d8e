//! Book (inventory) model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// A catalog title and its copy counters.
///
/// `available_copies` never leaves `0..=total_copies`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub category: String,
    /// Unique inventory code (ISBN)
    pub code: String,
    pub price: Decimal,
    pub total_copies: i32,
    pub available_copies: i32,
    pub description: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub code: String,
    pub price: Decimal,
    /// Defaults to the configured copies per book
    #[validate(range(min = 1, message = "At least one copy required"))]
    pub total_copies: Option<i32>,
    pub description: Option<String>,
}

/// Update book request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub code: Option<String>,
    pub price: Option<Decimal>,
    #[validate(range(min = 1, message = "At least one copy required"))]
    pub total_copies: Option<i32>,
    pub description: Option<String>,
}

/// Book query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookQuery {
    pub category: Option<String>,
    /// Case-insensitive match on title or author
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
