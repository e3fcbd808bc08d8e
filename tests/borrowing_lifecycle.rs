//! End-to-end borrowing, fine and sweeper flows over the in-memory store

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use libris_server::{
    clock::{Clock, ManualClock},
    config::{AuthConfig, SweeperConfig},
    models::{
        book::CreateBook,
        borrowing::CreateBorrowing,
        fine::FineQuery,
        group::CreateGroup,
        user::RegisterUser,
        Actor, Book, BorrowType, BorrowingStatus, DamageLevel, Fine, FineType, GroupStatus, Notice,
        Settlement, SettlementKind, Severity, User, UserRole,
    },
    repository::{BookRepository, MemoryRepository, UserRepository},
    services::{notifier::Notifier, Services},
    AppError,
};

/// Keeps every notice for later assertions
#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn titles(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }

    fn count(&self, title: &str) -> usize {
        self.titles().iter().filter(|t| t.as_str() == title).count()
    }

    fn last(&self) -> Notice {
        self.notices.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

struct Library {
    repository: Arc<MemoryRepository>,
    clock: ManualClock,
    notifier: Arc<RecordingNotifier>,
    services: Services,
    admin: Actor,
}

impl Library {
    async fn open() -> Self {
        let repository = Arc::new(MemoryRepository::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2023, 12, 2, 0, 0, 0).unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let services = Services::new(
            repository.clone(),
            notifier.clone(),
            Arc::new(clock.clone()),
            AuthConfig::default(),
            &SweeperConfig::default(),
        );

        let admin = User::new("admin@example.com", "Admin", "hash".to_string(), UserRole::Admin, clock.now());
        repository.insert_user(&admin).await.unwrap();

        Self {
            repository,
            clock,
            notifier,
            services,
            admin: Actor::admin(admin.id),
        }
    }

    async fn reader(&self, email: &str) -> Actor {
        let response = self
            .services
            .auth
            .register(RegisterUser {
                email: email.to_string(),
                password: "reading-is-fun".to_string(),
                full_name: "Avid Reader".to_string(),
            })
            .await
            .unwrap();
        Actor::user(response.user.id)
    }

    async fn book(&self, price: i64, copies: i32) -> Book {
        self.services
            .books
            .create_book(
                self.admin,
                CreateBook {
                    title: "Middlemarch".to_string(),
                    author: "George Eliot".to_string(),
                    category: "fiction".to_string(),
                    code: Uuid::new_v4().to_string(),
                    price: Decimal::from(price),
                    total_copies: Some(copies),
                    description: None,
                },
            )
            .await
            .unwrap()
    }

    async fn stored_book(&self, id: Uuid) -> Book {
        self.repository.get_book(id).await.unwrap().unwrap()
    }

    async fn fine_of(&self, borrowing_id: Uuid) -> Fine {
        let borrowing = self.services.borrowings.get_borrowing(self.admin, borrowing_id).await.unwrap();
        let fine_id = borrowing.fine_id.expect("borrowing has a fine");
        self.services.fines.get_fine(self.admin, fine_id).await.unwrap()
    }

    async fn fine_count(&self) -> i64 {
        let (_, total) = self
            .services
            .fines
            .list_fines(self.admin, &FineQuery::default())
            .await
            .unwrap();
        total
    }
}

fn individual(book_id: Uuid) -> CreateBorrowing {
    CreateBorrowing {
        book_id,
        borrow_type: BorrowType::Individual,
        group_id: None,
    }
}

fn for_group(book_id: Uuid, group_id: Uuid) -> CreateBorrowing {
    CreateBorrowing {
        book_id,
        borrow_type: BorrowType::Group,
        group_id: Some(group_id),
    }
}

fn assert_copies_in_bounds(book: &Book) {
    assert!(book.available_copies >= 0, "available copies went negative");
    assert!(book.available_copies <= book.total_copies, "available exceeds total");
}

fn assert_total_is_sum(fine: &Fine) {
    assert_eq!(fine.total_fine, fine.late_fee + fine.damage_fine + fine.missing_fine);
}

#[tokio::test]
async fn test_due_date_is_thirty_days_out() {
    let library = Library::open().await;
    let reader = library.reader("ann@example.com").await;
    let book = library.book(100, 1).await;

    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    assert_eq!(borrowing.due_date, library.clock.now() + Duration::days(30));
    assert_eq!(borrowing.status, BorrowingStatus::Borrowed);
    assert_eq!(library.stored_book(book.id).await.available_copies, 0);
    assert_eq!(library.notifier.count("Book Borrowed"), 1);

    let me = library.services.auth.me(reader.user_id).await.unwrap();
    assert_eq!(me.current_borrowings, vec![borrowing.id]);
    assert_eq!(me.borrowing_history, vec![borrowing.id]);
}

#[tokio::test]
async fn test_last_copy_goes_to_first_borrower() {
    let library = Library::open().await;
    let first = library.reader("first@example.com").await;
    let second = library.reader("second@example.com").await;
    let book = library.book(100, 1).await;

    library.services.borrowings.create_borrowing(first, individual(book.id)).await.unwrap();
    let err = library
        .services
        .borrowings
        .create_borrowing(second, individual(book.id))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(msg) if msg == "No copies available"));
    let stored = library.stored_book(book.id).await;
    assert_eq!(stored.available_copies, 0);
    assert_copies_in_bounds(&stored);
}

#[tokio::test]
async fn test_ten_days_late_costs_five_hundred() {
    let library = Library::open().await;
    let reader = library.reader("late@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();
    assert_eq!(borrowing.due_date, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

    library.clock.set(Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap());
    let returned = library.services.borrowings.return_book(reader, borrowing.id, None).await.unwrap();

    assert_eq!(returned.status, BorrowingStatus::Returned);
    assert_eq!(returned.return_date, Some(library.clock.now()));
    let fine = library.fine_of(borrowing.id).await;
    assert_eq!(fine.fine_type, FineType::Late);
    assert_eq!(fine.days_late, 10);
    assert_eq!(fine.late_fee, Decimal::from(500));
    assert_eq!(fine.total_fine, Decimal::from(500));
    assert_eq!(fine.user_id, reader.user_id);
    assert_total_is_sum(&fine);

    assert_eq!(library.notifier.last().title, "Book Returned with Fine");
    assert_eq!(library.notifier.last().severity, Severity::Warning);
    let stored = library.stored_book(book.id).await;
    assert_eq!(stored.available_copies, 1);
    assert_copies_in_bounds(&stored);

    let me = library.services.auth.me(reader.user_id).await.unwrap();
    assert!(me.current_borrowings.is_empty());
    assert_eq!(me.fines, vec![fine.id]);
}

#[tokio::test]
async fn test_major_damage_on_time_costs_book_price() {
    let library = Library::open().await;
    let reader = library.reader("clumsy@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    library.clock.advance(Duration::days(5));
    let returned = library
        .services
        .borrowings
        .return_book(reader, borrowing.id, Some(DamageLevel::Major))
        .await
        .unwrap();

    assert_eq!(returned.damage_level, Some(DamageLevel::Major));
    let fine = library.fine_of(borrowing.id).await;
    assert_eq!(fine.fine_type, FineType::Damage);
    assert_eq!(fine.late_fee, Decimal::ZERO);
    assert_eq!(fine.damage_fine, Decimal::from(100));
    assert_eq!(fine.total_fine, Decimal::from(100));
}

#[tokio::test]
async fn test_on_time_clean_return_has_no_fine() {
    let library = Library::open().await;
    let reader = library.reader("tidy@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    library.clock.advance(Duration::days(30));
    let returned = library.services.borrowings.return_book(reader, borrowing.id, None).await.unwrap();

    assert!(returned.fine_id.is_none());
    assert_eq!(library.fine_count().await, 0);
    assert_eq!(library.notifier.last().title, "Book Returned");
}

#[tokio::test]
async fn test_lost_book_retires_copy_and_charges_twice_price() {
    let library = Library::open().await;
    let reader = library.reader("lost@example.com").await;
    let book = library.book(200, 2).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();
    let before = library.stored_book(book.id).await;

    let lost = library.services.borrowings.mark_as_lost(library.admin, borrowing.id).await.unwrap();

    assert_eq!(lost.status, BorrowingStatus::Lost);
    let fine = library.fine_of(borrowing.id).await;
    assert_eq!(fine.fine_type, FineType::Missing);
    assert_eq!(fine.missing_fine, Decimal::from(400));
    assert_eq!(fine.total_fine, Decimal::from(400));
    assert_total_is_sum(&fine);

    let after = library.stored_book(book.id).await;
    assert_eq!(after.total_copies, before.total_copies - 1);
    assert_eq!(after.available_copies, before.available_copies - 1);
    assert_copies_in_bounds(&after);
    assert_eq!(library.notifier.last().severity, Severity::Error);

    let err = library.services.borrowings.mark_as_lost(library.admin, borrowing.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Book already marked as lost"));
    let err = library.services.borrowings.return_book(reader, borrowing.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_loss_after_overdue_sweep_charges_only_missing_fine() {
    let library = Library::open().await;
    let reader = library.reader("overdue-loss@example.com").await;
    let book = library.book(200, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    library.clock.advance(Duration::days(33));
    library.services.sweeper.detect_overdue().await.unwrap();
    let late = library.fine_of(borrowing.id).await;
    assert_eq!(late.late_fee, Decimal::from(150));

    let lost = library.services.borrowings.mark_as_lost(library.admin, borrowing.id).await.unwrap();

    assert_eq!(lost.status, BorrowingStatus::Lost);
    let fine = library.fine_of(borrowing.id).await;
    let settings = library.services.settings.current().await.unwrap();
    assert_eq!(fine.id, late.id);
    assert_eq!(fine.fine_type, FineType::Missing);
    assert_eq!(fine.late_fee, Decimal::ZERO);
    assert_eq!(fine.damage_fine, Decimal::ZERO);
    assert_eq!(fine.missing_fine, book.price * settings.missing_fine_multiplier);
    assert_eq!(fine.total_fine, fine.missing_fine);
    assert_eq!(fine.total_fine, Decimal::from(400));
    assert_eq!(library.fine_count().await, 1);
}

#[tokio::test]
async fn test_returned_borrowing_accepts_no_further_transition() {
    let library = Library::open().await;
    let reader = library.reader("done@example.com").await;
    let book = library.book(100, 2).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();
    library.services.borrowings.return_book(reader, borrowing.id, None).await.unwrap();
    let shelved = library.stored_book(book.id).await;

    let err = library.services.borrowings.return_book(reader, borrowing.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Book already returned"));
    let err = library.services.borrowings.mark_as_lost(library.admin, borrowing.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Book already returned"));

    library.clock.advance(Duration::days(60));
    let report = library.services.sweeper.detect_overdue().await.unwrap();
    assert_eq!(report.examined, 0);

    let stored = library.services.borrowings.get_borrowing(library.admin, borrowing.id).await.unwrap();
    assert_eq!(stored.status, BorrowingStatus::Returned);
    assert_eq!(library.stored_book(book.id).await.total_copies, shelved.total_copies);
    assert_eq!(library.stored_book(book.id).await.available_copies, shelved.available_copies);
    assert_eq!(library.fine_count().await, 0);
}

#[tokio::test]
async fn test_paying_twice_is_rejected() {
    let library = Library::open().await;
    let reader = library.reader("payer@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();
    library
        .services
        .borrowings
        .return_book(reader, borrowing.id, Some(DamageLevel::Minor))
        .await
        .unwrap();
    let fine = library.fine_of(borrowing.id).await;
    assert_eq!(fine.total_fine, Decimal::from(50));

    let paid = library.services.fines.pay_fine(reader, fine.id).await.unwrap();
    assert!(matches!(paid.settlement, Settlement::Paid { .. }));

    let err = library.services.fines.pay_fine(reader, fine.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Fine already paid"));
}

#[tokio::test]
async fn test_waived_fine_is_not_a_payment() {
    let library = Library::open().await;
    let reader = library.reader("lucky@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();
    library.services.borrowings.mark_as_lost(library.admin, borrowing.id).await.unwrap();
    let fine = library.fine_of(borrowing.id).await;

    let err = library.services.fines.waive_fine(reader, fine.id).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let waived = library.services.fines.waive_fine(library.admin, fine.id).await.unwrap();
    assert_eq!(waived.settlement.kind(), SettlementKind::Waived);
    assert_eq!(waived.total_fine, Decimal::ZERO);

    let paid_only = FineQuery {
        status: Some(SettlementKind::Paid),
        ..FineQuery::default()
    };
    let (paid, _) = library.services.fines.list_fines(library.admin, &paid_only).await.unwrap();
    assert!(paid.is_empty());
}

#[tokio::test]
async fn test_overdue_sweep_is_idempotent() {
    let library = Library::open().await;
    let reader = library.reader("slow@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    library.clock.advance(Duration::days(32));
    let first = library.services.sweeper.detect_overdue().await.unwrap();
    let second = library.services.sweeper.detect_overdue().await.unwrap();

    assert_eq!(first.examined, 1);
    assert_eq!(first.updated, 1);
    assert_eq!(second.updated, 0);
    let stored = library.services.borrowings.get_borrowing(reader, borrowing.id).await.unwrap();
    assert_eq!(stored.status, BorrowingStatus::Overdue);
    assert_eq!(library.fine_count().await, 1);

    let fine = library.fine_of(borrowing.id).await;
    assert_eq!(fine.days_late, 2);
    assert_eq!(fine.late_fee, Decimal::from(100));
    assert_eq!(library.notifier.count("Overdue Book"), 1);
}

#[tokio::test]
async fn test_refresh_then_return_completes_the_same_fine() {
    let library = Library::open().await;
    let reader = library.reader("slower@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    library.clock.advance(Duration::days(31));
    library.services.sweeper.detect_overdue().await.unwrap();
    let swept = library.fine_of(borrowing.id).await;
    assert_eq!(swept.late_fee, Decimal::from(50));

    library.clock.advance(Duration::days(3));
    let refresh = library.services.sweeper.refresh_fines().await.unwrap();
    assert_eq!(refresh.updated, 1);
    let refreshed = library.fine_of(borrowing.id).await;
    assert_eq!(refreshed.id, swept.id);
    assert_eq!(refreshed.days_late, 4);
    assert_eq!(refreshed.late_fee, Decimal::from(200));
    assert_eq!(library.notifier.count("Updated Fine"), 1);

    library.clock.advance(Duration::days(1));
    library
        .services
        .borrowings
        .return_book(reader, borrowing.id, Some(DamageLevel::Minor))
        .await
        .unwrap();

    let settled = library.fine_of(borrowing.id).await;
    assert_eq!(settled.id, swept.id);
    assert_eq!(settled.late_fee, Decimal::from(250));
    assert_eq!(settled.damage_fine, Decimal::from(50));
    assert_eq!(settled.total_fine, Decimal::from(300));
    assert_total_is_sum(&settled);
    assert_eq!(library.fine_count().await, 1);

    // Returned borrowings are no longer refreshed
    library.clock.advance(Duration::days(2));
    let refresh = library.services.sweeper.refresh_fines().await.unwrap();
    assert_eq!(refresh.updated, 0);
}

#[tokio::test]
async fn test_reminders_only_for_borrowings_due_soon() {
    let library = Library::open().await;
    let soon = library.reader("soon@example.com").await;
    let later = library.reader("later@example.com").await;
    let book = library.book(100, 2).await;
    library.services.borrowings.create_borrowing(soon, individual(book.id)).await.unwrap();

    library.clock.advance(Duration::days(10));
    library.services.borrowings.create_borrowing(later, individual(book.id)).await.unwrap();

    // First borrowing is now due in 3 days, the second in 13
    library.clock.advance(Duration::days(17));
    let report = library.services.sweeper.send_reminders().await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.updated, 1);
    let notice = library.notifier.last();
    assert_eq!(notice.title, "Borrowing Reminder");
    assert_eq!(notice.user_id, soon.user_id);
    assert!(notice.message.contains("due in 3 days"));
}

#[tokio::test]
async fn test_run_all_reports_each_pass() {
    let library = Library::open().await;
    let reader = library.reader("report@example.com").await;
    let book = library.book(100, 1).await;
    library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    library.clock.advance(Duration::days(31));
    let report = library.services.sweeper.run_all().await.unwrap();

    assert_eq!(report.overdue.updated, 1);
    assert_eq!(report.fine_refresh.examined, 1);
    assert_eq!(report.reminders.examined, 0);
    assert_eq!(library.fine_count().await, 1);
}

#[tokio::test]
async fn test_group_borrowing_flow() {
    let library = Library::open().await;
    let leader = library.reader("leader@example.com").await;
    let mut members = Vec::new();
    for i in 0..3 {
        members.push(library.reader(&format!("member{}@example.com", i)).await.user_id);
    }
    let book = library.book(100, 3).await;

    let group = library
        .services
        .groups
        .create_group(
            leader,
            CreateGroup {
                name: "Book Club".to_string(),
                member_ids: members.clone(),
            },
        )
        .await
        .unwrap();

    let err = library
        .services
        .borrowings
        .create_borrowing(leader, for_group(book.id, group.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Invalid or unapproved group"));

    let approved = library.services.groups.approve_group(library.admin, group.id).await.unwrap();
    assert_eq!(approved.status, GroupStatus::Approved);

    let member = Actor::user(members[0]);
    let err = library
        .services
        .borrowings
        .create_borrowing(member, for_group(book.id, group.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let borrowing = library
        .services
        .borrowings
        .create_borrowing(leader, for_group(book.id, group.id))
        .await
        .unwrap();
    assert_eq!(borrowing.due_date, library.clock.now() + Duration::days(180));

    let err = library
        .services
        .borrowings
        .create_borrowing(leader, for_group(book.id, group.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Group already has an active borrowing"));

    // Members may read, only the leader may return
    library.services.borrowings.get_borrowing(member, borrowing.id).await.unwrap();
    let err = library.services.borrowings.return_book(member, borrowing.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
    let err = library
        .services
        .borrowings
        .get_borrowing(Actor::user(Uuid::new_v4()), borrowing.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = library.services.groups.dissolve_group(library.admin, group.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    library.services.borrowings.return_book(leader, borrowing.id, None).await.unwrap();
    let group = library.services.groups.get_group(member, group.id).await.unwrap();
    assert!(group.current_borrowing.is_none());

    library
        .services
        .borrowings
        .create_borrowing(leader, for_group(book.id, group.id))
        .await
        .unwrap();
    assert_copies_in_bounds(&library.stored_book(book.id).await);
}

#[tokio::test]
async fn test_group_below_minimum_size_rejected() {
    let library = Library::open().await;
    let leader = library.reader("solo@example.com").await;
    let friend = library.reader("friend@example.com").await;
    let other = library.reader("other@example.com").await;

    let err = library
        .services
        .groups
        .create_group(
            leader,
            CreateGroup {
                name: "Tiny".to_string(),
                member_ids: vec![friend.user_id, other.user_id],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_extend_only_moves_active_deadlines_forward() {
    let library = Library::open().await;
    let reader = library.reader("extend@example.com").await;
    let book = library.book(100, 1).await;
    let borrowing = library.services.borrowings.create_borrowing(reader, individual(book.id)).await.unwrap();

    let err = library
        .services
        .borrowings
        .extend_deadline(reader, borrowing.id, borrowing.due_date + Duration::days(7))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = library
        .services
        .borrowings
        .extend_deadline(library.admin, borrowing.id, borrowing.due_date)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "New due date must be later than current"));

    let extended = library
        .services
        .borrowings
        .extend_deadline(library.admin, borrowing.id, borrowing.due_date + Duration::days(7))
        .await
        .unwrap();
    assert_eq!(extended.due_date, borrowing.due_date + Duration::days(7));
    assert_eq!(library.notifier.count("Borrowing Extended"), 1);

    library.clock.advance(Duration::days(40));
    library.services.sweeper.detect_overdue().await.unwrap();
    let err = library
        .services
        .borrowings
        .extend_deadline(library.admin, borrowing.id, extended.due_date + Duration::days(7))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg == "Cannot extend non-active borrowing"));
}
