use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    fines::{insert_fine_in, update_fine_in},
    parse_column, PgRepository,
};
use crate::{
    error::{AppError, AppResult},
    models::{BorrowType, Borrower, Borrowing, BorrowingStatus, Fine, Page},
    repository::{BorrowingClosure, BorrowingFilter, BorrowingRepository, FineWrite, InventoryChange},
};

#[derive(sqlx::FromRow)]
struct BorrowingRow {
    id: Uuid,
    book_id: Uuid,
    borrow_type: String,
    user_id: Option<Uuid>,
    group_id: Option<Uuid>,
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: String,
    damage_level: Option<String>,
    fine_id: Option<Uuid>,
}

impl TryFrom<BorrowingRow> for Borrowing {
    type Error = AppError;

    fn try_from(row: BorrowingRow) -> Result<Self, Self::Error> {
        let borrower = match (parse_column::<BorrowType>(&row.borrow_type)?, row.user_id, row.group_id) {
            (BorrowType::Individual, Some(user_id), None) => Borrower::Individual(user_id),
            (BorrowType::Group, None, Some(group_id)) => Borrower::Group(group_id),
            _ => {
                return Err(AppError::Internal(format!(
                    "Corrupt borrower on borrowing {}",
                    row.id
                )))
            }
        };

        Ok(Borrowing {
            id: row.id,
            book_id: row.book_id,
            borrower,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: parse_column(&row.status)?,
            damage_level: row.damage_level.as_deref().map(parse_column).transpose()?,
            fine_id: row.fine_id,
        })
    }
}

fn push_borrowing_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &BorrowingFilter) {
    builder.push(" WHERE TRUE");
    if let Some(user) = filter.visible_to {
        builder
            .push(" AND (b.user_id = ")
            .push_bind(user)
            .push(" OR b.group_id IN (SELECT id FROM groups WHERE leader_id = ")
            .push_bind(user)
            .push(" OR ")
            .push_bind(user)
            .push(" = ANY(member_ids)))");
    }
    if let Some(status) = filter.status {
        builder.push(" AND b.status = ").push_bind(status.as_str());
    }
    if let Some(borrow_type) = filter.borrow_type {
        builder.push(" AND b.borrow_type = ").push_bind(borrow_type.as_str());
    }
}

#[async_trait]
impl BorrowingRepository for PgRepository {
    async fn get_borrowing(&self, id: Uuid) -> AppResult<Option<Borrowing>> {
        sqlx::query_as::<_, BorrowingRow>("SELECT * FROM borrowings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Borrowing::try_from)
            .transpose()
    }

    async fn list_borrowings(&self, filter: &BorrowingFilter, page: Page) -> AppResult<(Vec<Borrowing>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM borrowings b");
        push_borrowing_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT b.* FROM borrowings b");
        push_borrowing_filters(&mut query, filter);
        query
            .push(" ORDER BY b.borrow_date DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<BorrowingRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let borrowings = rows
            .into_iter()
            .map(Borrowing::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((borrowings, total))
    }

    async fn list_borrowings_due(
        &self,
        status: BorrowingStatus,
        due_before: DateTime<Utc>,
        due_after: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Borrowing>> {
        let rows = sqlx::query_as::<_, BorrowingRow>(
            r#"
            SELECT * FROM borrowings
            WHERE status = $1 AND due_date < $2 AND ($3::timestamptz IS NULL OR due_date > $3)
            ORDER BY due_date
            "#,
        )
        .bind(status.as_str())
        .bind(due_before)
        .bind(due_after)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Borrowing::try_from).collect()
    }

    async fn open_borrowing(&self, borrowing: &Borrowing, max_active: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-decrement: never drives the counter below zero
        let reserved = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies - 1
            WHERE id = $1 AND NOT is_deleted AND available_copies > 0
            "#,
        )
        .bind(borrowing.book_id)
        .execute(&mut *tx)
        .await?;

        if reserved.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1 AND NOT is_deleted)")
                    .bind(borrowing.book_id)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                AppError::BadRequest("No copies available".to_string())
            } else {
                AppError::NotFound("Book not found".to_string())
            });
        }

        if let Borrower::Individual(user_id) = borrowing.borrower {
            // Row lock serializes concurrent borrowings of the same user
            let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            if locked.is_none() {
                return Err(AppError::NotFound("User not found".to_string()));
            }

            let active: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND status IN ('borrowed', 'overdue')",
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
            if active >= i64::from(max_active) {
                return Err(AppError::BadRequest("Borrowing limit reached".to_string()));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO borrowings (id, book_id, borrow_type, user_id, group_id, borrow_date,
                                    due_date, return_date, status, damage_level, fine_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(borrowing.id)
        .bind(borrowing.book_id)
        .bind(borrowing.borrower.borrow_type().as_str())
        .bind(borrowing.borrower.user_id())
        .bind(borrowing.borrower.group_id())
        .bind(borrowing.borrow_date)
        .bind(borrowing.due_date)
        .bind(borrowing.return_date)
        .bind(borrowing.status.as_str())
        .bind(borrowing.damage_level.map(|d| d.as_str()))
        .bind(borrowing.fine_id)
        .execute(&mut *tx)
        .await?;

        if let Borrower::Group(group_id) = borrowing.borrower {
            let claimed = sqlx::query(
                "UPDATE groups SET current_borrowing_id = $2 WHERE id = $1 AND current_borrowing_id IS NULL",
            )
            .bind(group_id)
            .bind(borrowing.id)
            .execute(&mut *tx)
            .await?;

            if claimed.rows_affected() == 0 {
                let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM groups WHERE id = $1)")
                    .bind(group_id)
                    .fetch_one(&mut *tx)
                    .await?;
                return Err(if exists {
                    AppError::BadRequest("Group already has an active borrowing".to_string())
                } else {
                    AppError::NotFound("Group not found".to_string())
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close_borrowing(&self, closure: &BorrowingClosure) -> AppResult<Option<Fine>> {
        let next = &closure.borrowing;
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE borrowings SET status = $2, return_date = $3, damage_level = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(next.id)
        .bind(next.status.as_str())
        .bind(next.return_date)
        .bind(next.damage_level.map(|d| d.as_str()))
        .bind(closure.expected_status.as_str())
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM borrowings WHERE id = $1)")
                .bind(next.id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists {
                AppError::Conflict("Borrowing was modified concurrently".to_string())
            } else {
                AppError::NotFound("Borrowing not found".to_string())
            });
        }

        let inventory_sql = match closure.inventory {
            InventoryChange::Restock => {
                "UPDATE books SET available_copies = LEAST(available_copies + 1, total_copies) WHERE id = $1"
            }
            InventoryChange::Retire => {
                r#"
                UPDATE books
                SET total_copies = GREATEST(total_copies - 1, 0),
                    available_copies = LEAST(GREATEST(available_copies - 1, 0), GREATEST(total_copies - 1, 0))
                WHERE id = $1
                "#
            }
        };
        sqlx::query(inventory_sql)
            .bind(next.book_id)
            .execute(&mut *tx)
            .await?;

        if let Borrower::Group(group_id) = next.borrower {
            sqlx::query(
                "UPDATE groups SET current_borrowing_id = NULL WHERE id = $1 AND current_borrowing_id = $2",
            )
            .bind(group_id)
            .bind(next.id)
            .execute(&mut *tx)
            .await?;
        }

        let fine = match &closure.fine {
            Some(FineWrite::Create(fine)) => Some(insert_fine_in(&mut tx, fine).await?),
            Some(FineWrite::Update(fine)) => {
                let saved = update_fine_in(&mut tx, fine).await?;
                sqlx::query("UPDATE borrowings SET fine_id = $2 WHERE id = $1")
                    .bind(next.id)
                    .bind(saved.id)
                    .execute(&mut *tx)
                    .await?;
                Some(saved)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(fine)
    }

    async fn mark_overdue(&self, id: Uuid, fine: &FineWrite) -> AppResult<Option<Fine>> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query("UPDATE borrowings SET status = 'overdue' WHERE id = $1 AND status = 'borrowed'")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let stored = match fine {
            FineWrite::Create(fine) => insert_fine_in(&mut tx, fine).await?,
            FineWrite::Update(fine) => {
                let saved = update_fine_in(&mut tx, fine).await?;
                sqlx::query("UPDATE borrowings SET fine_id = $2 WHERE id = $1")
                    .bind(id)
                    .bind(saved.id)
                    .execute(&mut *tx)
                    .await?;
                saved
            }
        };

        tx.commit().await?;
        Ok(Some(stored))
    }

    async fn extend_due_date(&self, id: Uuid, new_due_date: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE borrowings SET due_date = $2 WHERE id = $1 AND status = 'borrowed' AND due_date < $2",
        )
        .bind(id)
        .bind(new_due_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
