//! Overdue sweeper: scheduled detection, reminders and late-fee refresh
//!
//! Each pass tolerates per-item failures: the item is logged and counted,
//! and the pass moves on. A pass-level failure (settings unavailable,
//! listing query failed) aborts that pass; the next scheduled run retries.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::{
    clock::Clock,
    config::SweeperConfig,
    error::{AppError, AppResult},
    models::{Borrowing, BorrowingStatus, Fine, FineType, Notice, Settings, Severity},
    repository::{FineWrite, SharedRepository},
    services::{
        borrowings::{borrowed_book, responsible_user},
        notifier::Notifier,
        policy,
    },
};

/// Outcome counters of one pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PassReport {
    pub examined: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub overdue: PassReport,
    pub reminders: PassReport,
    pub fine_refresh: PassReport,
}

#[derive(Clone)]
pub struct SweeperService {
    repository: SharedRepository,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    reminder_window_days: i64,
}

impl SweeperService {
    pub fn new(
        repository: SharedRepository,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        reminder_window_days: i64,
    ) -> Self {
        Self {
            repository,
            notifier,
            clock,
            reminder_window_days,
        }
    }

    /// Run all three passes now
    pub async fn run_all(&self) -> AppResult<SweepReport> {
        Ok(SweepReport {
            overdue: self.detect_overdue().await?,
            fine_refresh: self.refresh_fines().await?,
            reminders: self.send_reminders().await?,
        })
    }

    /// Pass 1: move past-due borrowings to OVERDUE and charge their late fee
    pub async fn detect_overdue(&self) -> AppResult<PassReport> {
        let settings = self.repository.current_settings().await?;
        let now = self.clock.now();
        let candidates = self
            .repository
            .list_borrowings_due(BorrowingStatus::Borrowed, now, None)
            .await?;

        let mut report = PassReport::default();
        for borrowing in candidates {
            report.examined += 1;
            match self.process_overdue(&borrowing, now, &settings).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {
                    tracing::debug!("Borrowing {} changed before it could be marked overdue", borrowing.id)
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Overdue check failed for borrowing {}: {}", borrowing.id, e);
                }
            }
        }

        tracing::info!(
            "Overdue check completed: {} examined, {} marked, {} failed",
            report.examined,
            report.updated,
            report.failed
        );
        Ok(report)
    }

    async fn process_overdue(&self, borrowing: &Borrowing, now: DateTime<Utc>, settings: &Settings) -> AppResult<bool> {
        let payer = responsible_user(&self.repository, &borrowing.borrower).await?;
        let book = borrowed_book(&self.repository, borrowing.book_id).await?;

        let write = match self.repository.find_open_fine(borrowing.id).await? {
            Some(mut fine) => {
                policy::refresh_late_fee(&mut fine, borrowing.due_date, now, settings);
                FineWrite::Update(fine)
            }
            None => {
                let mut fine = Fine::new(borrowing.id, payer.id, FineType::Late, now);
                policy::refresh_late_fee(&mut fine, borrowing.due_date, now, settings);
                FineWrite::Create(fine)
            }
        };

        // Status and fine land together; a concurrent return or loss wins
        let fine = match self.repository.mark_overdue(borrowing.id, &write).await? {
            Some(fine) => fine,
            None => return Ok(false),
        };

        self.notifier
            .notify(Notice::new(
                payer.id,
                &payer.email,
                "Overdue Book",
                format!(
                    "Your borrowing of {} is overdue by {} days. Fine: {}",
                    book.title, fine.days_late, fine.total_fine
                ),
                Severity::Warning,
            ))
            .await;
        Ok(true)
    }

    /// Pass 2: remind borrowers whose due date falls within the reminder window
    pub async fn send_reminders(&self) -> AppResult<PassReport> {
        let now = self.clock.now();
        let window_end = now + Duration::days(self.reminder_window_days);
        // Inclusive upper bound at the storage's microsecond precision
        let due = self
            .repository
            .list_borrowings_due(
                BorrowingStatus::Borrowed,
                window_end + Duration::microseconds(1),
                Some(now),
            )
            .await?;

        let mut report = PassReport::default();
        for borrowing in due {
            report.examined += 1;
            match self.remind(&borrowing, now).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Reminder failed for borrowing {}: {}", borrowing.id, e);
                }
            }
        }

        tracing::info!("Reminder job completed: {} sent, {} failed", report.updated, report.failed);
        Ok(report)
    }

    async fn remind(&self, borrowing: &Borrowing, now: DateTime<Utc>) -> AppResult<()> {
        let user = responsible_user(&self.repository, &borrowing.borrower).await?;
        let book = borrowed_book(&self.repository, borrowing.book_id).await?;
        let days_left = policy::days_left(borrowing.due_date, now);
        self.notifier
            .notify(Notice::new(
                user.id,
                &user.email,
                "Borrowing Reminder",
                format!("Your borrowing of {} is due in {} days.", book.title, days_left),
                Severity::Info,
            ))
            .await;
        Ok(())
    }

    /// Pass 3: recompute unsettled late fines of borrowings still overdue
    pub async fn refresh_fines(&self) -> AppResult<PassReport> {
        let settings = self.repository.current_settings().await?;
        let now = self.clock.now();
        let fines = self.repository.list_open_late_fines().await?;

        let mut report = PassReport::default();
        for fine in fines {
            report.examined += 1;
            match self.refresh_fine(fine.clone(), now, &settings).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Late fee update failed for fine {}: {}", fine.id, e);
                }
            }
        }

        tracing::info!(
            "Late fee update completed: {} refreshed, {} failed",
            report.updated,
            report.failed
        );
        Ok(report)
    }

    async fn refresh_fine(&self, mut fine: Fine, now: DateTime<Utc>, settings: &Settings) -> AppResult<bool> {
        let borrowing = self
            .repository
            .get_borrowing(fine.borrowing_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Borrowing not found".to_string()))?;
        if borrowing.status != BorrowingStatus::Overdue {
            return Ok(false);
        }

        policy::refresh_late_fee(&mut fine, borrowing.due_date, now, settings);
        let fine = self.repository.save_fine(&fine).await?;

        let book = borrowed_book(&self.repository, borrowing.book_id).await?;
        match self.repository.get_user(fine.user_id).await? {
            Some(user) => {
                self.notifier
                    .notify(Notice::new(
                        user.id,
                        &user.email,
                        "Updated Fine",
                        format!("Your fine for {} has been updated to {}.", book.title, fine.total_fine),
                        Severity::Warning,
                    ))
                    .await
            }
            None => tracing::warn!("Payer {} of fine {} not found", fine.user_id, fine.id),
        }
        Ok(true)
    }

    /// Start the daily schedule: one task per pass
    pub fn spawn_scheduler(&self, config: &SweeperConfig) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_daily("overdue check", config.overdue_at, |s| async move {
                s.detect_overdue().await.map(|_| ())
            }),
            self.spawn_daily("late fee update", config.fine_refresh_at, |s| async move {
                s.refresh_fines().await.map(|_| ())
            }),
            self.spawn_daily("reminder", config.reminder_at, |s| async move {
                s.send_reminders().await.map(|_| ())
            }),
        ]
    }

    fn spawn_daily<F, Fut>(&self, name: &'static str, at: NaiveTime, pass: F) -> JoinHandle<()>
    where
        F: Fn(SweeperService) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = AppResult<()>> + Send + 'static,
    {
        let service = self.clone();
        tokio::spawn(async move {
            loop {
                let wait = until_next(Utc::now(), at);
                tracing::debug!("Next {} job in {:?}", name, wait);
                tokio::time::sleep(wait).await;

                tracing::info!("Running {} job", name);
                if let Err(e) = pass(service.clone()).await {
                    tracing::error!("{} job failed: {}", name, e);
                }
            }
        })
    }
}

/// Time from `now` until the next occurrence of `at` (UTC), never zero
pub fn until_next(now: DateTime<Utc>, at: NaiveTime) -> std::time::Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now { today } else { today + Duration::days(1) };
    (next - now).to_std().unwrap_or(std::time::Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        models::{Book, Borrower, User, UserRole},
        repository::{BookRepository, BorrowingRepository, FineRepository, MemoryRepository, UserRepository},
        services::notifier::MockNotifier,
    };
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_failed_payer_lookup_leaves_borrowing_for_next_run() {
        let repository = Arc::new(MemoryRepository::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        let start = clock.now();

        let reader = User::new("late@example.com", "Late Reader", "hash".to_string(), UserRole::User, start);
        repository.insert_user(&reader).await.unwrap();
        let book = Book {
            id: Uuid::new_v4(),
            title: "Persuasion".to_string(),
            author: "Jane Austen".to_string(),
            category: "fiction".to_string(),
            code: Uuid::new_v4().to_string(),
            price: Decimal::from(200),
            total_copies: 1,
            available_copies: 1,
            description: None,
            is_deleted: false,
            created_at: start,
            updated_at: start,
        };
        repository.insert_book(&book).await.unwrap();
        let borrowing = Borrowing::new(book.id, Borrower::Individual(reader.id), start, start + Duration::days(30));
        repository.open_borrowing(&borrowing, 5).await.unwrap();

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.title == "Overdue Book")
            .times(1)
            .returning(|_| ());
        let sweeper = SweeperService::new(repository.clone(), Arc::new(notifier), Arc::new(clock.clone()), 3);
        clock.advance(Duration::days(33));

        repository.remove_user(reader.id).await;
        let report = sweeper.detect_overdue().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 0);
        let stored = repository.get_borrowing(borrowing.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BorrowingStatus::Borrowed);
        assert!(repository.find_open_fine(borrowing.id).await.unwrap().is_none());

        repository.insert_user(&reader).await.unwrap();
        let report = sweeper.detect_overdue().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.updated, 1);
        let stored = repository.get_borrowing(borrowing.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BorrowingStatus::Overdue);
        let fine = repository.find_open_fine(borrowing.id).await.unwrap().unwrap();
        assert_eq!(stored.fine_id, Some(fine.id));
        assert_eq!(fine.days_late, 3);
        assert_eq!(fine.late_fee, Decimal::from(150));
        assert_eq!(fine.total_fine, Decimal::from(150));
    }

    #[test]
    fn test_until_next_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(until_next(now, at), std::time::Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_until_next_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let at = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(until_next(now, at), std::time::Duration::from_secs(24 * 3600));

        let midnight = NaiveTime::MIN;
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
        assert_eq!(until_next(late, midnight), std::time::Duration::from_secs(3600));
    }
}
