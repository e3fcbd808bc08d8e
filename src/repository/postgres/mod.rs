//! PostgreSQL repository backend

mod books;
mod borrowings;
mod feedback;
mod fines;
mod groups;
mod notifications;
mod settings;
mod users;

use sqlx::{Pool, Postgres};

use crate::error::AppError;

#[derive(Clone)]
pub struct PgRepository {
    pool: Pool<Postgres>,
}

impl PgRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// Parse a text column into one of the model enums
pub(crate) fn parse_column<T>(value: &str) -> Result<T, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e: String| AppError::Internal(format!("Corrupt row: {}", e)))
}

/// Map a unique-constraint violation to a conflict carrying `message`
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}
