use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{conflict_on_unique, parse_column, PgRepository};
use crate::{
    error::AppResult,
    models::User,
    repository::UserRepository,
};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: String,
    password_hash: String,
    role: String,
    status: String,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl PgRepository {
    /// Attach the borrowing and fine references derived from their tables
    async fn hydrate_user(&self, row: UserRow) -> AppResult<User> {
        let borrowings: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT id, status FROM borrowings WHERE user_id = $1 ORDER BY borrow_date, id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let fines: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM fines WHERE user_id = $1 ORDER BY created_at, id")
                .bind(row.id)
                .fetch_all(&self.pool)
                .await?;

        let current_borrowings = borrowings
            .iter()
            .filter(|(_, status)| status == "borrowed" || status == "overdue")
            .map(|(id, _)| *id)
            .collect();

        Ok(User {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            role: parse_column(&row.role)?,
            status: parse_column(&row.status)?,
            current_borrowings,
            borrowing_history: borrowings.into_iter().map(|(id, _)| id).collect(),
            fines,
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate_user(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate_user(row).await?)),
            None => Ok(None),
        }
    }

    async fn insert_user(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, role, status, last_login, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.last_login)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User with this email already exists"))?;
        Ok(())
    }

    async fn count_existing_users(&self, ids: &[Uuid]) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
