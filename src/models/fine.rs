//! Fine model and settlement states

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Cause of a fine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FineType {
    Late,
    Missing,
    Damage,
}

impl FineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineType::Late => "late",
            FineType::Missing => "missing",
            FineType::Damage => "damage",
        }
    }
}

impl std::str::FromStr for FineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "late" => Ok(FineType::Late),
            "missing" => Ok(FineType::Missing),
            "damage" => Ok(FineType::Damage),
            _ => Err(format!("Invalid fine type: {}", s)),
        }
    }
}

/// Settlement state: a waiver is recorded as such, never as a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Settlement {
    Unpaid,
    #[serde(rename_all = "camelCase")]
    Paid {
        paid_date: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Waived {
        waived_date: DateTime<Utc>,
        /// Total that was owed when the fine was waived
        waived_amount: Decimal,
    },
}

impl Settlement {
    pub fn kind(&self) -> SettlementKind {
        match self {
            Settlement::Unpaid => SettlementKind::Unpaid,
            Settlement::Paid { .. } => SettlementKind::Paid,
            Settlement::Waived { .. } => SettlementKind::Waived,
        }
    }
}

/// Settlement state without its payload, for filtering and storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    Unpaid,
    Paid,
    Waived,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementKind::Unpaid => "unpaid",
            SettlementKind::Paid => "paid",
            SettlementKind::Waived => "waived",
        }
    }
}

impl std::str::FromStr for SettlementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unpaid" => Ok(SettlementKind::Unpaid),
            "paid" => Ok(SettlementKind::Paid),
            "waived" => Ok(SettlementKind::Waived),
            _ => Err(format!("Invalid fine status: {}", s)),
        }
    }
}

/// A monetary penalty tied to one borrowing.
///
/// `total_fine` always equals `late_fee + damage_fine + missing_fine`; use the
/// setters below rather than writing the components directly.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Fine {
    pub id: Uuid,
    pub borrowing_id: Uuid,
    /// Responsible payer
    pub user_id: Uuid,
    pub fine_type: FineType,
    pub late_fee: Decimal,
    pub damage_fine: Decimal,
    pub missing_fine: Decimal,
    pub total_fine: Decimal,
    pub days_late: i64,
    #[serde(flatten)]
    pub settlement: Settlement,
    /// Optimistic concurrency token, bumped on every save
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fine {
    pub fn new(borrowing_id: Uuid, user_id: Uuid, fine_type: FineType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            borrowing_id,
            user_id,
            fine_type,
            late_fee: Decimal::ZERO,
            damage_fine: Decimal::ZERO,
            missing_fine: Decimal::ZERO,
            total_fine: Decimal::ZERO,
            days_late: 0,
            settlement: Settlement::Unpaid,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settlement != Settlement::Unpaid
    }

    pub fn set_late_fee(&mut self, days_late: i64, late_fee: Decimal) {
        self.days_late = days_late;
        self.late_fee = to_cents(late_fee);
        self.recompute_total();
    }

    pub fn set_damage_fine(&mut self, damage_fine: Decimal) {
        self.damage_fine = to_cents(damage_fine);
        self.recompute_total();
    }

    pub fn set_missing_fine(&mut self, missing_fine: Decimal) {
        self.missing_fine = to_cents(missing_fine);
        self.recompute_total();
    }

    pub fn recompute_total(&mut self) {
        self.total_fine = self.late_fee + self.damage_fine + self.missing_fine;
    }
}

/// Amounts are stored with two decimal places; half a cent rounds up
fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Update fine request (admin)
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFine {
    pub late_fee: Option<Decimal>,
    pub damage_fine: Option<Decimal>,
    pub missing_fine: Option<Decimal>,
}

/// Fine query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FineQuery {
    pub status: Option<SettlementKind>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
