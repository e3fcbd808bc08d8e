//! Borrowing engine: opening, returning, extending and losing borrowings
//!
//! Every mutation reads the settings fresh, checks its preconditions, and
//! hands the multi-entity write to the repository as one unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        borrowing::{BorrowingQuery, CreateBorrowing},
        Actor, Book, BorrowType, Borrower, Borrowing, BorrowingStatus, DamageLevel, Fine,
        FineType, GroupStatus, Notice, Page, Severity, User,
    },
    repository::{BorrowingClosure, BorrowingFilter, FineWrite, InventoryChange, SharedRepository},
    services::{notifier::Notifier, policy},
};

fn closed_message(status: BorrowingStatus) -> String {
    match status {
        BorrowingStatus::Lost => "Book already marked as lost".to_string(),
        _ => "Book already returned".to_string(),
    }
}

/// The user who owes any fine: the borrower, or the group's current leader
pub(crate) async fn responsible_user(repository: &SharedRepository, borrower: &Borrower) -> AppResult<User> {
    let user_id = match borrower {
        Borrower::Individual(user_id) => *user_id,
        Borrower::Group(group_id) => {
            repository
                .get_group(*group_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?
                .leader_id
        }
    };
    repository
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// The book behind a borrowing, soft-deleted or not
pub(crate) async fn borrowed_book(repository: &SharedRepository, book_id: Uuid) -> AppResult<Book> {
    repository
        .get_book(book_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
}

pub(crate) fn format_date(date: DateTime<Utc>) -> String {
    date.format("%a %b %d %Y").to_string()
}

#[derive(Clone)]
pub struct BorrowingsService {
    repository: SharedRepository,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl BorrowingsService {
    pub fn new(repository: SharedRepository, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            notifier,
            clock,
        }
    }

    async fn find(&self, id: Uuid) -> AppResult<Borrowing> {
        self.repository
            .get_borrowing(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Borrowing not found".to_string()))
    }

    /// Read access: the borrower or any member of the borrowing group
    async fn check_read(&self, actor: Actor, borrowing: &Borrowing) -> AppResult<()> {
        if actor.is_admin() {
            return Ok(());
        }
        let allowed = match borrowing.borrower {
            Borrower::Individual(user_id) => user_id == actor.user_id,
            Borrower::Group(group_id) => self
                .repository
                .get_group(group_id)
                .await?
                .is_some_and(|g| g.is_member(actor.user_id)),
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::Authorization("Access denied".to_string()))
        }
    }

    /// Write access: the borrower or the group's leader
    async fn check_write(&self, actor: Actor, borrowing: &Borrowing) -> AppResult<()> {
        if actor.is_admin() {
            return Ok(());
        }
        let allowed = match borrowing.borrower {
            Borrower::Individual(user_id) => user_id == actor.user_id,
            Borrower::Group(group_id) => self
                .repository
                .get_group(group_id)
                .await?
                .is_some_and(|g| g.is_leader(actor.user_id)),
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::Authorization("Access denied".to_string()))
        }
    }

    async fn notify(&self, user: &User, title: &str, message: String, severity: Severity) {
        self.notifier
            .notify(Notice::new(user.id, &user.email, title, message, severity))
            .await;
    }

    pub async fn create_borrowing(&self, actor: Actor, data: CreateBorrowing) -> AppResult<Borrowing> {
        let settings = self.repository.current_settings().await?;

        let book = self
            .repository
            .get_book(data.book_id)
            .await?
            .filter(|b| !b.is_deleted)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        if book.available_copies < 1 {
            return Err(AppError::BadRequest("No copies available".to_string()));
        }

        let user = self
            .repository
            .get_user(actor.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let borrower = match data.borrow_type {
            BorrowType::Individual => {
                if user.current_borrowings.len() as i32 >= settings.max_books_per_user {
                    return Err(AppError::BadRequest("Borrowing limit reached".to_string()));
                }
                Borrower::Individual(user.id)
            }
            BorrowType::Group => {
                let group_id = data.group_id.ok_or_else(|| {
                    AppError::BadRequest("Group ID is required for group borrowing".to_string())
                })?;
                let group = self
                    .repository
                    .get_group(group_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;
                if group.status != GroupStatus::Approved {
                    return Err(AppError::BadRequest("Invalid or unapproved group".to_string()));
                }
                if !group.is_leader(user.id) {
                    return Err(AppError::Authorization("Only group leader can borrow".to_string()));
                }
                if group.current_borrowing.is_some() {
                    return Err(AppError::BadRequest(
                        "Group already has an active borrowing".to_string(),
                    ));
                }
                Borrower::Group(group.id)
            }
        };

        let now = self.clock.now();
        let due_date = policy::due_date(now, &borrower, &settings);
        let borrowing = Borrowing::new(book.id, borrower, now, due_date);

        // Guards are re-checked atomically by the repository
        self.repository
            .open_borrowing(&borrowing, settings.max_books_per_user)
            .await?;

        tracing::info!(
            "Book borrowed: {} ({}) by {}, borrowing {}",
            book.title,
            book.id,
            user.email,
            borrowing.id
        );
        self.notify(
            &user,
            "Book Borrowed",
            format!(
                "You have borrowed \"{}\". Due date: {}",
                book.title,
                format_date(due_date)
            ),
            Severity::Info,
        )
        .await;

        Ok(borrowing)
    }

    pub async fn list_borrowings(&self, actor: Actor, query: &BorrowingQuery) -> AppResult<(Vec<Borrowing>, i64)> {
        let filter = BorrowingFilter {
            visible_to: (!actor.is_admin()).then_some(actor.user_id),
            status: query.status,
            borrow_type: query.borrow_type,
        };
        self.repository
            .list_borrowings(&filter, Page::new(query.page, query.per_page))
            .await
    }

    pub async fn get_borrowing(&self, actor: Actor, id: Uuid) -> AppResult<Borrowing> {
        let borrowing = self.find(id).await?;
        self.check_read(actor, &borrowing).await?;
        Ok(borrowing)
    }

    pub async fn return_book(&self, actor: Actor, id: Uuid, damage: Option<DamageLevel>) -> AppResult<Borrowing> {
        let borrowing = self.find(id).await?;
        self.check_write(actor, &borrowing).await?;
        if !borrowing.status.can_transition_to(BorrowingStatus::Returned) {
            return Err(AppError::BadRequest(closed_message(borrowing.status)));
        }

        let settings = self.repository.current_settings().await?;
        let book = borrowed_book(&self.repository, borrowing.book_id).await?;
        let payer = responsible_user(&self.repository, &borrowing.borrower).await?;
        let now = self.clock.now();

        // A sweeper-created late fine is completed rather than duplicated
        let existing = self.repository.find_open_fine(id).await?;
        let mut fine = existing
            .clone()
            .unwrap_or_else(|| Fine::new(id, payer.id, FineType::Late, now));
        policy::apply_return_charges(&mut fine, borrowing.due_date, now, damage, book.price, &settings);
        let fine_write = match existing {
            Some(_) => Some(FineWrite::Update(fine)),
            None if fine.total_fine > Decimal::ZERO => Some(FineWrite::Create(fine)),
            None => None,
        };

        let mut returned = borrowing.clone();
        returned.status = BorrowingStatus::Returned;
        returned.return_date = Some(now);
        if damage.is_some() {
            returned.damage_level = damage;
        }

        let stored_fine = self
            .repository
            .close_borrowing(&BorrowingClosure {
                borrowing: returned,
                expected_status: borrowing.status,
                inventory: InventoryChange::Restock,
                fine: fine_write,
            })
            .await?;

        match &stored_fine {
            Some(fine) if fine.total_fine > Decimal::ZERO => {
                self.notify(
                    &payer,
                    "Book Returned with Fine",
                    format!("Book \"{}\" returned. Fine: {}", book.title, fine.total_fine),
                    Severity::Warning,
                )
                .await;
            }
            _ => {
                self.notify(
                    &payer,
                    "Book Returned",
                    format!("Book \"{}\" returned successfully", book.title),
                    Severity::Info,
                )
                .await;
            }
        }
        tracing::info!("Book returned: {} ({}) by {}", book.title, id, actor.user_id);

        self.find(id).await
    }

    pub async fn extend_deadline(&self, actor: Actor, id: Uuid, new_due_date: DateTime<Utc>) -> AppResult<Borrowing> {
        actor.require_admin()?;
        let borrowing = self.find(id).await?;
        if borrowing.status != BorrowingStatus::Borrowed {
            return Err(AppError::BadRequest("Cannot extend non-active borrowing".to_string()));
        }
        if new_due_date <= borrowing.due_date {
            return Err(AppError::BadRequest(
                "New due date must be later than current".to_string(),
            ));
        }

        if !self.repository.extend_due_date(id, new_due_date).await? {
            return Err(AppError::Conflict("Borrowing was modified concurrently".to_string()));
        }

        let book = borrowed_book(&self.repository, borrowing.book_id).await?;
        let user = responsible_user(&self.repository, &borrowing.borrower).await?;
        self.notify(
            &user,
            "Borrowing Extended",
            format!(
                "Due date for \"{}\" extended to {}",
                book.title,
                format_date(new_due_date)
            ),
            Severity::Info,
        )
        .await;
        tracing::info!("Borrowing {} extended to {}", id, new_due_date);

        self.find(id).await
    }

    pub async fn mark_as_lost(&self, actor: Actor, id: Uuid) -> AppResult<Borrowing> {
        actor.require_admin()?;
        let borrowing = self.find(id).await?;
        if !borrowing.status.can_transition_to(BorrowingStatus::Lost) {
            return Err(AppError::BadRequest(closed_message(borrowing.status)));
        }

        let settings = self.repository.current_settings().await?;
        let book = borrowed_book(&self.repository, borrowing.book_id).await?;
        let payer = responsible_user(&self.repository, &borrowing.borrower).await?;
        let now = self.clock.now();

        let existing = self.repository.find_open_fine(id).await?;
        let mut fine = existing
            .clone()
            .unwrap_or_else(|| Fine::new(id, payer.id, FineType::Missing, now));
        policy::apply_loss_charges(&mut fine, now, book.price, &settings);
        let fine_write = match existing {
            Some(_) => FineWrite::Update(fine),
            None => FineWrite::Create(fine),
        };

        let mut lost = borrowing.clone();
        lost.status = BorrowingStatus::Lost;

        let stored_fine = self
            .repository
            .close_borrowing(&BorrowingClosure {
                borrowing: lost,
                expected_status: borrowing.status,
                inventory: InventoryChange::Retire,
                fine: Some(fine_write),
            })
            .await?;

        let total = stored_fine.map(|f| f.total_fine).unwrap_or_default();
        self.notify(
            &payer,
            "Book Lost",
            format!("Book \"{}\" marked as lost. Fine: {}", book.title, total),
            Severity::Error,
        )
        .await;
        tracing::info!("Book marked as lost: {} ({}) by admin {}", book.title, id, actor.user_id);

        self.find(id).await
    }
}
