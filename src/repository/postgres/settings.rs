use async_trait::async_trait;
use rust_decimal::Decimal;

use super::PgRepository;
use crate::{error::AppResult, models::Settings, repository::SettingsRepository};

#[derive(sqlx::FromRow)]
struct SettingsRow {
    individual_borrow_days: i64,
    group_borrow_days: i64,
    late_fee_per_day: Decimal,
    missing_fine_multiplier: Decimal,
    group_min_members: i32,
    group_max_members: i32,
    max_books_per_user: i32,
    copies_per_book: i32,
}

impl From<SettingsRow> for Settings {
    fn from(row: SettingsRow) -> Self {
        Settings {
            individual_borrow_days: row.individual_borrow_days,
            group_borrow_days: row.group_borrow_days,
            late_fee_per_day: row.late_fee_per_day,
            missing_fine_multiplier: row.missing_fine_multiplier,
            group_min_members: row.group_min_members,
            group_max_members: row.group_max_members,
            max_books_per_user: row.max_books_per_user,
            copies_per_book: row.copies_per_book,
        }
    }
}

#[async_trait]
impl SettingsRepository for PgRepository {
    async fn current_settings(&self) -> AppResult<Settings> {
        if let Some(row) = sqlx::query_as::<_, SettingsRow>("SELECT * FROM settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(row.into());
        }

        // First access: store the defaults. Concurrent callers converge on one row.
        let defaults = Settings::default();
        sqlx::query(
            r#"
            INSERT INTO settings (id, individual_borrow_days, group_borrow_days, late_fee_per_day,
                                  missing_fine_multiplier, group_min_members, group_max_members,
                                  max_books_per_user, copies_per_book)
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(defaults.individual_borrow_days)
        .bind(defaults.group_borrow_days)
        .bind(defaults.late_fee_per_day)
        .bind(defaults.missing_fine_multiplier)
        .bind(defaults.group_min_members)
        .bind(defaults.group_max_members)
        .bind(defaults.max_books_per_user)
        .bind(defaults.copies_per_book)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, SettingsRow>("SELECT * FROM settings WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }
}
