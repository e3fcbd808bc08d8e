use async_trait::async_trait;
use uuid::Uuid;

use super::PgRepository;
use crate::{
    error::AppResult,
    models::{Feedback, Page},
    repository::FeedbackRepository,
};

#[async_trait]
impl FeedbackRepository for PgRepository {
    async fn insert_feedback(&self, feedback: &Feedback) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback (id, user_id, book_id, title, comment, rating, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.user_id)
        .bind(feedback.book_id)
        .bind(&feedback.title)
        .bind(&feedback.comment)
        .bind(feedback.rating)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_feedback(&self, id: Uuid) -> AppResult<Option<Feedback>> {
        let feedback = sqlx::query_as::<_, Feedback>("SELECT * FROM feedback WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feedback)
    }

    async fn list_feedback(&self, book_id: Option<Uuid>, page: Page) -> AppResult<(Vec<Feedback>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE ($1::uuid IS NULL OR book_id = $1)")
                .bind(book_id)
                .fetch_one(&self.pool)
                .await?;

        let feedback = sqlx::query_as::<_, Feedback>(
            r#"
            SELECT * FROM feedback
            WHERE ($1::uuid IS NULL OR book_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(book_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((feedback, total))
    }

    async fn delete_feedback(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM feedback WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
