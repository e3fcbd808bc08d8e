//! Data models for Libris

pub mod book;
pub mod borrowing;
pub mod feedback;
pub mod fine;
pub mod group;
pub mod notification;
pub mod settings;
pub mod user;

// Re-export commonly used types
pub use book::Book;
pub use borrowing::{Borrower, BorrowType, Borrowing, BorrowingStatus, DamageLevel};
pub use feedback::Feedback;
pub use fine::{Fine, FineType, Settlement, SettlementKind};
pub use group::{Group, GroupStatus};
pub use notification::{Notice, Notification, Severity};
pub use settings::Settings;
pub use user::{Actor, User, UserRole, UserStatus};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// Normalized pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    /// Slice an already filtered and sorted list
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset() as usize)
            .take(self.limit() as usize)
            .cloned()
            .collect()
    }
}
