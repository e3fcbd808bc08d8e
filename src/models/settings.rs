//! Library policy settings

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// System-wide borrowing and fine policy (single logical row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub individual_borrow_days: i64,
    pub group_borrow_days: i64,
    pub late_fee_per_day: Decimal,
    pub missing_fine_multiplier: Decimal,
    pub group_min_members: i32,
    pub group_max_members: i32,
    pub max_books_per_user: i32,
    pub copies_per_book: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            individual_borrow_days: 30,
            group_borrow_days: 180,
            late_fee_per_day: Decimal::from(50),
            missing_fine_multiplier: Decimal::from(2),
            group_min_members: 3,
            group_max_members: 6,
            max_books_per_user: 1,
            copies_per_book: 3,
        }
    }
}
