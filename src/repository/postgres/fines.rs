use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{conflict_on_unique, parse_column, PgRepository};
use crate::{
    error::{AppError, AppResult},
    models::{Fine, Page, Settlement, SettlementKind},
    repository::FineRepository,
};

#[derive(sqlx::FromRow)]
pub(super) struct FineRow {
    id: Uuid,
    borrowing_id: Uuid,
    user_id: Uuid,
    fine_type: String,
    late_fee: Decimal,
    damage_fine: Decimal,
    missing_fine: Decimal,
    total_fine: Decimal,
    days_late: i64,
    status: String,
    paid_date: Option<DateTime<Utc>>,
    waived_date: Option<DateTime<Utc>>,
    waived_amount: Option<Decimal>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FineRow> for Fine {
    type Error = AppError;

    fn try_from(row: FineRow) -> Result<Self, Self::Error> {
        let corrupt = || AppError::Internal(format!("Corrupt settlement on fine {}", row.id));
        let settlement = match parse_column::<SettlementKind>(&row.status)? {
            SettlementKind::Unpaid => Settlement::Unpaid,
            SettlementKind::Paid => Settlement::Paid {
                paid_date: row.paid_date.ok_or_else(corrupt)?,
            },
            SettlementKind::Waived => Settlement::Waived {
                waived_date: row.waived_date.ok_or_else(corrupt)?,
                waived_amount: row.waived_amount.ok_or_else(corrupt)?,
            },
        };

        Ok(Fine {
            id: row.id,
            borrowing_id: row.borrowing_id,
            user_id: row.user_id,
            fine_type: parse_column(&row.fine_type)?,
            late_fee: row.late_fee,
            damage_fine: row.damage_fine,
            missing_fine: row.missing_fine,
            total_fine: row.total_fine,
            days_late: row.days_late,
            settlement,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Settlement columns: (status, paid_date, waived_date, waived_amount)
fn settlement_columns(
    settlement: &Settlement,
) -> (&'static str, Option<DateTime<Utc>>, Option<DateTime<Utc>>, Option<Decimal>) {
    match settlement {
        Settlement::Unpaid => ("unpaid", None, None, None),
        Settlement::Paid { paid_date } => ("paid", Some(*paid_date), None, None),
        Settlement::Waived {
            waived_date,
            waived_amount,
        } => ("waived", None, Some(*waived_date), Some(*waived_amount)),
    }
}

/// Insert a fine and point its borrowing at it
pub(super) async fn insert_fine_in(conn: &mut PgConnection, fine: &Fine) -> AppResult<Fine> {
    let (status, paid_date, waived_date, waived_amount) = settlement_columns(&fine.settlement);
    let row = sqlx::query_as::<_, FineRow>(
        r#"
        INSERT INTO fines (id, borrowing_id, user_id, fine_type, late_fee, damage_fine, missing_fine,
                           total_fine, days_late, status, paid_date, waived_date, waived_amount,
                           version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING *
        "#,
    )
    .bind(fine.id)
    .bind(fine.borrowing_id)
    .bind(fine.user_id)
    .bind(fine.fine_type.as_str())
    .bind(fine.late_fee)
    .bind(fine.damage_fine)
    .bind(fine.missing_fine)
    .bind(fine.total_fine)
    .bind(fine.days_late)
    .bind(status)
    .bind(paid_date)
    .bind(waived_date)
    .bind(waived_amount)
    .bind(fine.version)
    .bind(fine.created_at)
    .bind(fine.updated_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, "Borrowing already has an unsettled fine"))?;

    sqlx::query("UPDATE borrowings SET fine_id = $2 WHERE id = $1")
        .bind(fine.borrowing_id)
        .bind(fine.id)
        .execute(&mut *conn)
        .await?;

    row.try_into()
}

/// Save a fine if its stored version still matches
pub(super) async fn update_fine_in(conn: &mut PgConnection, fine: &Fine) -> AppResult<Fine> {
    let (status, paid_date, waived_date, waived_amount) = settlement_columns(&fine.settlement);
    let row = sqlx::query_as::<_, FineRow>(
        r#"
        UPDATE fines
        SET fine_type = $3, late_fee = $4, damage_fine = $5, missing_fine = $6, total_fine = $7,
            days_late = $8, status = $9, paid_date = $10, waived_date = $11, waived_amount = $12,
            updated_at = $13, version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING *
        "#,
    )
    .bind(fine.id)
    .bind(fine.version)
    .bind(fine.fine_type.as_str())
    .bind(fine.late_fee)
    .bind(fine.damage_fine)
    .bind(fine.missing_fine)
    .bind(fine.total_fine)
    .bind(fine.days_late)
    .bind(status)
    .bind(paid_date)
    .bind(waived_date)
    .bind(waived_amount)
    .bind(fine.updated_at)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, "Borrowing already has an unsettled fine"))?;

    match row {
        Some(row) => row.try_into(),
        None => {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM fines WHERE id = $1)")
                .bind(fine.id)
                .fetch_one(&mut *conn)
                .await?;
            if exists {
                Err(AppError::Conflict("Fine was modified concurrently".to_string()))
            } else {
                Err(AppError::NotFound("Fine not found".to_string()))
            }
        }
    }
}

fn push_fine_filters(builder: &mut QueryBuilder<'_, Postgres>, user: Option<Uuid>, status: Option<SettlementKind>) {
    builder.push(" WHERE TRUE");
    if let Some(user) = user {
        builder.push(" AND user_id = ").push_bind(user);
    }
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl FineRepository for PgRepository {
    async fn get_fine(&self, id: Uuid) -> AppResult<Option<Fine>> {
        sqlx::query_as::<_, FineRow>("SELECT * FROM fines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Fine::try_from)
            .transpose()
    }

    async fn find_open_fine(&self, borrowing_id: Uuid) -> AppResult<Option<Fine>> {
        sqlx::query_as::<_, FineRow>("SELECT * FROM fines WHERE borrowing_id = $1 AND status = 'unpaid'")
            .bind(borrowing_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Fine::try_from)
            .transpose()
    }

    async fn list_fines(&self, user: Option<Uuid>, status: Option<SettlementKind>, page: Page) -> AppResult<(Vec<Fine>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM fines");
        push_fine_filters(&mut count, user, status);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM fines");
        push_fine_filters(&mut query, user, status);
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<FineRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let fines = rows
            .into_iter()
            .map(Fine::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((fines, total))
    }

    async fn list_open_late_fines(&self) -> AppResult<Vec<Fine>> {
        let rows = sqlx::query_as::<_, FineRow>(
            "SELECT * FROM fines WHERE fine_type = 'late' AND status = 'unpaid' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Fine::try_from).collect()
    }

    async fn insert_fine(&self, fine: &Fine) -> AppResult<Fine> {
        let mut tx = self.pool.begin().await?;
        let stored = insert_fine_in(&mut tx, fine).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn save_fine(&self, fine: &Fine) -> AppResult<Fine> {
        let mut conn = self.pool.acquire().await?;
        update_fine_in(&mut conn, fine).await
    }
}
