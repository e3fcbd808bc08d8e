//! Borrowing and fine rules shared by the interactive paths and the sweeper
//!
//! Everything here is a pure function of its inputs. The settings snapshot
//! is passed in by the caller, who fetched it at the start of its operation.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::models::{Borrower, DamageLevel, Fine, FineType, Settings};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Due date of a borrowing opened at `borrow_date`
pub fn due_date(borrow_date: DateTime<Utc>, borrower: &Borrower, settings: &Settings) -> DateTime<Utc> {
    let days = match borrower {
        Borrower::Individual(_) => settings.individual_borrow_days,
        Borrower::Group(_) => settings.group_borrow_days,
    };
    borrow_date + Duration::days(days)
}

/// Whole days late, rounded up; zero unless `due_date < now`
pub fn days_late(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if due_date >= now {
        return 0;
    }
    let late = now - due_date;
    let secs = late.num_seconds();
    let days = secs / SECONDS_PER_DAY;
    // Any partial day, down to sub-second remainders, counts as a full one
    if secs % SECONDS_PER_DAY != 0 || late > Duration::seconds(secs) {
        days + 1
    } else {
        days
    }
}

/// Whole days until `due_date`, rounded up
pub fn days_left(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    days_late(now, due_date)
}

pub fn late_fee(days_late: i64, settings: &Settings) -> Decimal {
    Decimal::from(days_late) * settings.late_fee_per_day
}

/// Half the price for minor damage, the full price for major damage
pub fn damage_fine(level: Option<DamageLevel>, price: Decimal) -> Decimal {
    match level {
        Some(DamageLevel::Minor) => price / Decimal::from(2),
        Some(DamageLevel::Major) => price,
        Some(DamageLevel::None) | None => Decimal::ZERO,
    }
}

pub fn missing_fine(price: Decimal, settings: &Settings) -> Decimal {
    price * settings.missing_fine_multiplier
}

/// Recompute the late component of `fine` as of `now`
pub fn refresh_late_fee(fine: &mut Fine, due_date: DateTime<Utc>, now: DateTime<Utc>, settings: &Settings) {
    let days = days_late(due_date, now);
    fine.set_late_fee(days, late_fee(days, settings));
    fine.updated_at = now;
}

/// Apply the charges of a return to `fine`
///
/// Late fee and damage are both recomputed; a missing charge, if any, is
/// kept. A fine carrying a late fee stays a LATE fine.
pub fn apply_return_charges(
    fine: &mut Fine,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
    damage: Option<DamageLevel>,
    price: Decimal,
    settings: &Settings,
) {
    refresh_late_fee(fine, due_date, now, settings);
    fine.set_damage_fine(damage_fine(damage, price));
    fine.fine_type = if fine.late_fee > Decimal::ZERO {
        FineType::Late
    } else {
        FineType::Damage
    };
}

/// Apply the charge for a lost copy to `fine`
///
/// The missing charge replaces any late fee or damage already on the fine.
pub fn apply_loss_charges(fine: &mut Fine, now: DateTime<Utc>, price: Decimal, settings: &Settings) {
    fine.fine_type = FineType::Missing;
    fine.set_late_fee(0, Decimal::ZERO);
    fine.set_damage_fine(Decimal::ZERO);
    fine.set_missing_fine(missing_fine(price, settings));
    fine.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_due_date_uses_borrow_type_duration() {
        let settings = Settings::default();
        let start = at(2024, 3, 1);

        let individual = due_date(start, &Borrower::Individual(Uuid::new_v4()), &settings);
        assert_eq!(individual, start + Duration::days(30));

        let group = due_date(start, &Borrower::Group(Uuid::new_v4()), &settings);
        assert_eq!(group, start + Duration::days(180));
    }

    #[test]
    fn test_days_late_rounds_partial_days_up() {
        let due = at(2024, 1, 1);
        assert_eq!(days_late(due, due), 0);
        assert_eq!(days_late(due, due - Duration::hours(5)), 0);
        assert_eq!(days_late(due, due + Duration::seconds(1)), 1);
        assert_eq!(days_late(due, due + Duration::milliseconds(1)), 1);
        assert_eq!(days_late(due, at(2024, 1, 11)), 10);
        assert_eq!(days_late(due, at(2024, 1, 11) + Duration::hours(1)), 11);
    }

    #[test]
    fn test_days_left_counts_down_to_due() {
        let now = at(2024, 5, 1);
        assert_eq!(days_left(now + Duration::days(3), now), 3);
        assert_eq!(days_left(now + Duration::hours(30), now), 2);
        assert_eq!(days_left(now - Duration::days(1), now), 0);
    }

    #[test]
    fn test_ten_days_late_at_fifty_per_day() {
        let settings = Settings::default();
        let due = at(2024, 1, 1);
        let returned = at(2024, 1, 11);
        let mut fine = Fine::new(Uuid::new_v4(), Uuid::new_v4(), FineType::Late, returned);

        apply_return_charges(&mut fine, due, returned, None, Decimal::from(100), &settings);

        assert_eq!(fine.days_late, 10);
        assert_eq!(fine.late_fee, Decimal::from(500));
        assert_eq!(fine.damage_fine, Decimal::ZERO);
        assert_eq!(fine.total_fine, Decimal::from(500));
        assert_eq!(fine.fine_type, FineType::Late);
    }

    #[test]
    fn test_major_damage_on_time_costs_full_price() {
        let settings = Settings::default();
        let due = at(2024, 2, 1);
        let returned = at(2024, 1, 20);
        let mut fine = Fine::new(Uuid::new_v4(), Uuid::new_v4(), FineType::Late, returned);

        apply_return_charges(&mut fine, due, returned, Some(DamageLevel::Major), Decimal::from(100), &settings);

        assert_eq!(fine.late_fee, Decimal::ZERO);
        assert_eq!(fine.damage_fine, Decimal::from(100));
        assert_eq!(fine.total_fine, Decimal::from(100));
        assert_eq!(fine.fine_type, FineType::Damage);
    }

    #[test]
    fn test_minor_damage_costs_half_price() {
        assert_eq!(damage_fine(Some(DamageLevel::Minor), Decimal::new(2550, 2)), Decimal::new(1275, 2));
        assert_eq!(damage_fine(Some(DamageLevel::None), Decimal::from(80)), Decimal::ZERO);
        assert_eq!(damage_fine(None, Decimal::from(80)), Decimal::ZERO);
    }

    #[test]
    fn test_loss_charges_price_times_multiplier() {
        let settings = Settings::default();
        let now = at(2024, 4, 1);
        let mut fine = Fine::new(Uuid::new_v4(), Uuid::new_v4(), FineType::Missing, now);

        apply_loss_charges(&mut fine, now, Decimal::from(200), &settings);

        assert_eq!(fine.missing_fine, Decimal::from(400));
        assert_eq!(fine.late_fee, Decimal::ZERO);
        assert_eq!(fine.damage_fine, Decimal::ZERO);
        assert_eq!(fine.total_fine, Decimal::from(400));
    }

    #[test]
    fn test_loss_replaces_accrued_late_fee() {
        let settings = Settings::default();
        let due = at(2024, 1, 1);
        let now = at(2024, 1, 4);
        let mut fine = Fine::new(Uuid::new_v4(), Uuid::new_v4(), FineType::Late, due);
        refresh_late_fee(&mut fine, due, now, &settings);

        apply_loss_charges(&mut fine, now, Decimal::from(200), &settings);

        assert_eq!(fine.fine_type, FineType::Missing);
        assert_eq!(fine.days_late, 0);
        assert_eq!(fine.late_fee, Decimal::ZERO);
        assert_eq!(fine.missing_fine, Decimal::from(400));
        assert_eq!(fine.total_fine, Decimal::from(400));
        assert_eq!(fine.total_fine, fine.late_fee + fine.damage_fine + fine.missing_fine);
    }
}
