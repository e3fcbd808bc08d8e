//! Repository layer: persistence traits and their backends
//!
//! Services only see the traits below. Multi-entity workflows (opening and
//! closing a borrowing) are single calls so each backend can apply them as
//! one unit: a SQL transaction for PostgreSQL, one write lock in memory.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        Book, BorrowType, Borrowing, BorrowingStatus, Feedback, Fine, Group, GroupStatus,
        Notification, Page, Settings, SettlementKind, User,
    },
};

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// What happens to the book's copy counters when a borrowing closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryChange {
    /// The copy is back on the shelf
    Restock,
    /// The copy is permanently gone: total and available both drop by one
    Retire,
}

/// Fine write applied together with a borrowing closure
#[derive(Debug, Clone)]
pub enum FineWrite {
    Create(Fine),
    /// Saved only if the stored version still equals `fine.version`
    Update(Fine),
}

/// Terminal transition of a borrowing (return or loss)
#[derive(Debug, Clone)]
pub struct BorrowingClosure {
    /// The borrowing in its new state
    pub borrowing: Borrowing,
    /// Status the stored borrowing must still have
    pub expected_status: BorrowingStatus,
    pub inventory: InventoryChange,
    pub fine: Option<FineWrite>,
}

/// Filters for borrowing listings
#[derive(Debug, Clone, Default)]
pub struct BorrowingFilter {
    /// Restrict to borrowings of this user or of groups they belong to
    pub visible_to: Option<Uuid>,
    pub status: Option<BorrowingStatus>,
    pub borrow_type: Option<BorrowType>,
}

#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>>;
    async fn find_book_by_code(&self, code: &str) -> AppResult<Option<Book>>;
    async fn insert_book(&self, book: &Book) -> AppResult<()>;
    /// Save descriptive fields only; copy counters are never touched here
    async fn update_book_details(&self, book: &Book) -> AppResult<()>;
    /// Set the total copy count, shifting available copies by the same delta
    async fn resize_book(&self, id: Uuid, total_copies: i32) -> AppResult<Book>;
    async fn soft_delete_book(&self, id: Uuid) -> AppResult<bool>;
    async fn list_books(&self, category: Option<&str>, search: Option<&str>, page: Page) -> AppResult<(Vec<Book>, i64)>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn insert_user(&self, user: &User) -> AppResult<()>;
    async fn count_existing_users(&self, ids: &[Uuid]) -> AppResult<i64>;
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn get_group(&self, id: Uuid) -> AppResult<Option<Group>>;
    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<Group>>;
    async fn insert_group(&self, group: &Group) -> AppResult<()>;
    /// Save name and members; status and the borrowing slot are not touched
    async fn update_group_details(&self, group: &Group) -> AppResult<()>;
    /// Move from `from` to `to`; false when the stored status differs
    async fn set_group_status(&self, id: Uuid, from: GroupStatus, to: GroupStatus) -> AppResult<bool>;
    /// Dissolve unless a borrowing is active; false when refused
    async fn dissolve_group(&self, id: Uuid) -> AppResult<bool>;
    async fn list_groups(&self, member: Option<Uuid>, status: Option<GroupStatus>, page: Page) -> AppResult<(Vec<Group>, i64)>;
}

#[async_trait]
pub trait BorrowingRepository: Send + Sync {
    async fn get_borrowing(&self, id: Uuid) -> AppResult<Option<Borrowing>>;
    async fn list_borrowings(&self, filter: &BorrowingFilter, page: Page) -> AppResult<(Vec<Borrowing>, i64)>;
    /// Borrowings with `status` whose due date lies in `(due_after, due_before)`
    async fn list_borrowings_due(
        &self,
        status: BorrowingStatus,
        due_before: DateTime<Utc>,
        due_after: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Borrowing>>;
    /// Reserve a copy, claim the borrower's slot and store the borrowing.
    ///
    /// Fails with `BadRequest` (and commits nothing) when no copy is
    /// available, the individual limit `max_active` is reached, or the group
    /// already holds a borrowing.
    async fn open_borrowing(&self, borrowing: &Borrowing, max_active: i32) -> AppResult<()>;
    /// Apply a return or a loss; returns the stored fine, if any was written
    async fn close_borrowing(&self, closure: &BorrowingClosure) -> AppResult<Option<Fine>>;
    /// BORROWED -> OVERDUE together with its late fine, as one unit.
    ///
    /// Returns `None` (and writes nothing) when the borrowing was no longer
    /// BORROWED.
    async fn mark_overdue(&self, id: Uuid, fine: &FineWrite) -> AppResult<Option<Fine>>;
    /// Move the due date forward; false unless BORROWED and strictly later
    async fn extend_due_date(&self, id: Uuid, new_due_date: DateTime<Utc>) -> AppResult<bool>;
}

#[async_trait]
pub trait FineRepository: Send + Sync {
    async fn get_fine(&self, id: Uuid) -> AppResult<Option<Fine>>;
    /// The unsettled fine of a borrowing, if any
    async fn find_open_fine(&self, borrowing_id: Uuid) -> AppResult<Option<Fine>>;
    async fn list_fines(&self, user: Option<Uuid>, status: Option<SettlementKind>, page: Page) -> AppResult<(Vec<Fine>, i64)>;
    /// Unsettled LATE fines
    async fn list_open_late_fines(&self) -> AppResult<Vec<Fine>>;
    /// Store a new fine and link it to its borrowing and payer
    async fn insert_fine(&self, fine: &Fine) -> AppResult<Fine>;
    /// Save if the stored version matches; returns the fine with its new version
    async fn save_fine(&self, fine: &Fine) -> AppResult<Fine>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// The settings row, created with defaults on first access
    async fn current_settings(&self) -> AppResult<Settings>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<()>;
    async fn get_notification(&self, id: Uuid) -> AppResult<Option<Notification>>;
    async fn list_notifications(&self, user_id: Uuid, is_read: Option<bool>, page: Page) -> AppResult<(Vec<Notification>, i64)>;
    async fn mark_notification_read(&self, id: Uuid) -> AppResult<()>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> AppResult<u64>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn insert_feedback(&self, feedback: &Feedback) -> AppResult<()>;
    async fn get_feedback(&self, id: Uuid) -> AppResult<Option<Feedback>>;
    async fn list_feedback(&self, book_id: Option<Uuid>, page: Page) -> AppResult<(Vec<Feedback>, i64)>;
    async fn delete_feedback(&self, id: Uuid) -> AppResult<bool>;
}

/// Every repository a service may need
pub trait Repository:
    BookRepository
    + UserRepository
    + GroupRepository
    + BorrowingRepository
    + FineRepository
    + SettingsRepository
    + NotificationRepository
    + FeedbackRepository
    + Send
    + Sync
{
}

impl<T> Repository for T where
    T: BookRepository
        + UserRepository
        + GroupRepository
        + BorrowingRepository
        + FineRepository
        + SettingsRepository
        + NotificationRepository
        + FeedbackRepository
        + Send
        + Sync
{
}

pub type SharedRepository = Arc<dyn Repository>;
