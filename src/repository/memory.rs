//! In-memory repository for tests and local runs
//!
//! All state sits behind one lock, so every trait call is atomic with
//! respect to every other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BookRepository, BorrowingClosure, BorrowingFilter, BorrowingRepository, FeedbackRepository,
    FineRepository, FineWrite, GroupRepository, InventoryChange, NotificationRepository,
    SettingsRepository, UserRepository,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        Book, Borrower, Borrowing, BorrowingStatus, Feedback, Fine, FineType, Group, GroupStatus,
        Notification, Page, Settings, SettlementKind, User,
    },
};

#[derive(Debug, Default)]
struct State {
    settings: Option<Settings>,
    books: Vec<Book>,
    users: Vec<User>,
    groups: Vec<Group>,
    borrowings: Vec<Borrowing>,
    fines: Vec<Fine>,
    notifications: Vec<Notification>,
    feedback: Vec<Feedback>,
}

impl State {
    fn book_mut(&mut self, id: Uuid) -> Option<&mut Book> {
        self.books.iter_mut().find(|b| b.id == id)
    }

    fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn group_mut(&mut self, id: Uuid) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    fn has_open_fine(&self, borrowing_id: Uuid) -> bool {
        self.fines
            .iter()
            .any(|f| f.borrowing_id == borrowing_id && !f.is_settled())
    }

    /// Check a fine write without applying it
    fn check_fine_write(&self, write: &FineWrite) -> AppResult<()> {
        match write {
            FineWrite::Create(fine) => {
                if self.has_open_fine(fine.borrowing_id) {
                    return Err(AppError::Conflict(
                        "Borrowing already has an unsettled fine".to_string(),
                    ));
                }
                Ok(())
            }
            FineWrite::Update(fine) => {
                let stored = self
                    .fines
                    .iter()
                    .find(|f| f.id == fine.id)
                    .ok_or_else(|| AppError::NotFound("Fine not found".to_string()))?;
                if stored.version != fine.version {
                    return Err(AppError::Conflict("Fine was modified concurrently".to_string()));
                }
                Ok(())
            }
        }
    }

    fn create_fine(&mut self, fine: &Fine) -> Fine {
        let stored = fine.clone();
        if let Some(borrowing) = self.borrowings.iter_mut().find(|b| b.id == fine.borrowing_id) {
            borrowing.fine_id = Some(fine.id);
        }
        if let Some(user) = self.user_mut(fine.user_id) {
            if !user.fines.contains(&fine.id) {
                user.fines.push(fine.id);
            }
        }
        self.fines.push(stored.clone());
        stored
    }

    fn update_fine(&mut self, fine: &Fine) -> Option<Fine> {
        let stored = self.fines.iter_mut().find(|f| f.id == fine.id)?;
        *stored = fine.clone();
        stored.version += 1;
        Some(stored.clone())
    }

    fn visible_to(&self, borrowing: &Borrowing, user_id: Uuid) -> bool {
        match borrowing.borrower {
            Borrower::Individual(id) => id == user_id,
            Borrower::Group(group_id) => self
                .groups
                .iter()
                .any(|g| g.id == group_id && g.is_member(user_id)),
        }
    }
}

/// Repository keeping everything in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<RwLock<State>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with explicit policy settings instead of the defaults
    pub fn with_settings(settings: Settings) -> Self {
        let state = State {
            settings: Some(settings),
            ..State::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    #[cfg(test)]
    pub(crate) async fn remove_user(&self, id: Uuid) {
        self.state.write().await.users.retain(|u| u.id != id);
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: Page) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    (page.apply(&items), total)
}

#[async_trait]
impl BookRepository for MemoryRepository {
    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>> {
        let state = self.state.read().await;
        Ok(state.books.iter().find(|b| b.id == id).cloned())
    }

    async fn find_book_by_code(&self, code: &str) -> AppResult<Option<Book>> {
        let state = self.state.read().await;
        Ok(state.books.iter().find(|b| b.code == code).cloned())
    }

    async fn insert_book(&self, book: &Book) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.books.iter().any(|b| b.code == book.code) {
            return Err(AppError::Conflict("Book with this ISBN exists".to_string()));
        }
        state.books.push(book.clone());
        Ok(())
    }

    async fn update_book_details(&self, book: &Book) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.books.iter().any(|b| b.code == book.code && b.id != book.id) {
            return Err(AppError::Conflict("Book with this ISBN exists".to_string()));
        }
        let stored = state
            .book_mut(book.id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        stored.title = book.title.clone();
        stored.author = book.author.clone();
        stored.category = book.category.clone();
        stored.code = book.code.clone();
        stored.price = book.price;
        stored.description = book.description.clone();
        stored.updated_at = book.updated_at;
        Ok(())
    }

    async fn resize_book(&self, id: Uuid, total_copies: i32) -> AppResult<Book> {
        let mut state = self.state.write().await;
        let book = state
            .book_mut(id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        let delta = total_copies - book.total_copies;
        if book.available_copies + delta < 0 {
            return Err(AppError::BadRequest(
                "Cannot remove copies that are currently borrowed".to_string(),
            ));
        }
        book.total_copies = total_copies;
        book.available_copies += delta;
        Ok(book.clone())
    }

    async fn soft_delete_book(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.book_mut(id) {
            Some(book) => {
                book.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_books(&self, category: Option<&str>, search: Option<&str>, page: Page) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.read().await;
        let search = search.map(|s| s.to_lowercase());
        let mut books: Vec<Book> = state
            .books
            .iter()
            .filter(|b| !b.is_deleted)
            .filter(|b| category.map_or(true, |c| b.category == c))
            .filter(|b| {
                search.as_ref().map_or(true, |s| {
                    b.title.to_lowercase().contains(s) || b.author.to_lowercase().contains(s)
                })
            })
            .cloned()
            .collect();
        books.reverse();
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(books, page))
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.read().await;
        let email = email.to_lowercase();
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &User) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("User with this email already exists".to_string()));
        }
        state.users.push(user.clone());
        Ok(())
    }

    async fn count_existing_users(&self, ids: &[Uuid]) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state.users.iter().filter(|u| ids.contains(&u.id)).count() as i64)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.user_mut(id) {
            user.last_login = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl GroupRepository for MemoryRepository {
    async fn get_group(&self, id: Uuid) -> AppResult<Option<Group>> {
        let state = self.state.read().await;
        Ok(state.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<Group>> {
        let state = self.state.read().await;
        Ok(state.groups.iter().find(|g| g.name == name).cloned())
    }

    async fn insert_group(&self, group: &Group) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.groups.iter().any(|g| g.name == group.name) {
            return Err(AppError::Conflict("Group name already exists".to_string()));
        }
        state.groups.push(group.clone());
        Ok(())
    }

    async fn update_group_details(&self, group: &Group) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.groups.iter().any(|g| g.name == group.name && g.id != group.id) {
            return Err(AppError::Conflict("Group name already exists".to_string()));
        }
        let stored = state
            .group_mut(group.id)
            .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;
        stored.name = group.name.clone();
        stored.members = group.members.clone();
        stored.updated_at = group.updated_at;
        Ok(())
    }

    async fn set_group_status(&self, id: Uuid, from: GroupStatus, to: GroupStatus) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.group_mut(id) {
            Some(group) if group.status == from => {
                group.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn dissolve_group(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.group_mut(id) {
            Some(group) if group.current_borrowing.is_none() && group.status != GroupStatus::Dissolved => {
                group.status = GroupStatus::Dissolved;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_groups(&self, member: Option<Uuid>, status: Option<GroupStatus>, page: Page) -> AppResult<(Vec<Group>, i64)> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .groups
            .iter()
            .filter(|g| member.map_or(true, |m| g.is_member(m)))
            .filter(|g| status.map_or(true, |s| g.status == s))
            .cloned()
            .collect();
        groups.reverse();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(groups, page))
    }
}

#[async_trait]
impl BorrowingRepository for MemoryRepository {
    async fn get_borrowing(&self, id: Uuid) -> AppResult<Option<Borrowing>> {
        let state = self.state.read().await;
        Ok(state.borrowings.iter().find(|b| b.id == id).cloned())
    }

    async fn list_borrowings(&self, filter: &BorrowingFilter, page: Page) -> AppResult<(Vec<Borrowing>, i64)> {
        let state = self.state.read().await;
        let mut borrowings: Vec<Borrowing> = state
            .borrowings
            .iter()
            .filter(|b| filter.visible_to.map_or(true, |u| state.visible_to(b, u)))
            .filter(|b| filter.status.map_or(true, |s| b.status == s))
            .filter(|b| filter.borrow_type.map_or(true, |t| b.borrower.borrow_type() == t))
            .cloned()
            .collect();
        borrowings.reverse();
        borrowings.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date));
        Ok(paginate(borrowings, page))
    }

    async fn list_borrowings_due(
        &self,
        status: BorrowingStatus,
        due_before: DateTime<Utc>,
        due_after: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Borrowing>> {
        let state = self.state.read().await;
        Ok(state
            .borrowings
            .iter()
            .filter(|b| b.status == status && b.due_date < due_before)
            .filter(|b| due_after.map_or(true, |after| b.due_date > after))
            .cloned()
            .collect())
    }

    async fn open_borrowing(&self, borrowing: &Borrowing, max_active: i32) -> AppResult<()> {
        let mut state = self.state.write().await;

        // All guards first, so a refusal leaves nothing behind
        let book = state
            .books
            .iter()
            .find(|b| b.id == borrowing.book_id && !b.is_deleted)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        if book.available_copies < 1 {
            return Err(AppError::BadRequest("No copies available".to_string()));
        }
        match borrowing.borrower {
            Borrower::Individual(user_id) => {
                let user = state
                    .users
                    .iter()
                    .find(|u| u.id == user_id)
                    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
                if user.current_borrowings.len() as i32 >= max_active {
                    return Err(AppError::BadRequest("Borrowing limit reached".to_string()));
                }
            }
            Borrower::Group(group_id) => {
                let group = state
                    .groups
                    .iter()
                    .find(|g| g.id == group_id)
                    .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;
                if group.current_borrowing.is_some() {
                    return Err(AppError::BadRequest(
                        "Group already has an active borrowing".to_string(),
                    ));
                }
            }
        }

        if let Some(book) = state.book_mut(borrowing.book_id) {
            book.available_copies -= 1;
        }
        match borrowing.borrower {
            Borrower::Individual(user_id) => {
                if let Some(user) = state.user_mut(user_id) {
                    user.current_borrowings.push(borrowing.id);
                    user.borrowing_history.push(borrowing.id);
                }
            }
            Borrower::Group(group_id) => {
                if let Some(group) = state.group_mut(group_id) {
                    group.current_borrowing = Some(borrowing.id);
                }
            }
        }
        state.borrowings.push(borrowing.clone());
        Ok(())
    }

    async fn close_borrowing(&self, closure: &BorrowingClosure) -> AppResult<Option<Fine>> {
        let mut state = self.state.write().await;
        let next = &closure.borrowing;

        let stored = state
            .borrowings
            .iter()
            .find(|b| b.id == next.id)
            .ok_or_else(|| AppError::NotFound("Borrowing not found".to_string()))?;
        if stored.status != closure.expected_status || !stored.status.can_transition_to(next.status) {
            return Err(AppError::Conflict("Borrowing was modified concurrently".to_string()));
        }
        if let Some(write) = &closure.fine {
            state.check_fine_write(write)?;
        }

        if let Some(book) = state.book_mut(next.book_id) {
            match closure.inventory {
                InventoryChange::Restock => {
                    book.available_copies = (book.available_copies + 1).min(book.total_copies);
                }
                InventoryChange::Retire => {
                    book.total_copies = (book.total_copies - 1).max(0);
                    book.available_copies = (book.available_copies - 1).max(0).min(book.total_copies);
                }
            }
        }

        match next.borrower {
            Borrower::Individual(user_id) => {
                if let Some(user) = state.user_mut(user_id) {
                    user.current_borrowings.retain(|id| *id != next.id);
                }
            }
            Borrower::Group(group_id) => {
                if let Some(group) = state.group_mut(group_id) {
                    if group.current_borrowing == Some(next.id) {
                        group.current_borrowing = None;
                    }
                }
            }
        }

        let mut updated = next.clone();
        let fine = match &closure.fine {
            Some(FineWrite::Create(fine)) => Some(state.create_fine(fine)),
            Some(FineWrite::Update(fine)) => state.update_fine(fine),
            None => None,
        };
        if let Some(fine) = &fine {
            updated.fine_id = Some(fine.id);
        }
        if let Some(slot) = state.borrowings.iter_mut().find(|b| b.id == next.id) {
            *slot = updated;
        }
        Ok(fine)
    }

    async fn mark_overdue(&self, id: Uuid, fine: &FineWrite) -> AppResult<Option<Fine>> {
        let mut state = self.state.write().await;
        let movable = state
            .borrowings
            .iter()
            .any(|b| b.id == id && b.status.can_transition_to(BorrowingStatus::Overdue));
        if !movable {
            return Ok(None);
        }
        state.check_fine_write(fine)?;

        let stored = match fine {
            FineWrite::Create(fine) => state.create_fine(fine),
            FineWrite::Update(fine) => state
                .update_fine(fine)
                .ok_or_else(|| AppError::NotFound("Fine not found".to_string()))?,
        };
        if let Some(borrowing) = state.borrowings.iter_mut().find(|b| b.id == id) {
            borrowing.status = BorrowingStatus::Overdue;
            borrowing.fine_id = Some(stored.id);
        }
        Ok(Some(stored))
    }

    async fn extend_due_date(&self, id: Uuid, new_due_date: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.borrowings.iter_mut().find(|b| b.id == id) {
            Some(b) if b.status == BorrowingStatus::Borrowed && b.due_date < new_due_date => {
                b.due_date = new_due_date;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl FineRepository for MemoryRepository {
    async fn get_fine(&self, id: Uuid) -> AppResult<Option<Fine>> {
        let state = self.state.read().await;
        Ok(state.fines.iter().find(|f| f.id == id).cloned())
    }

    async fn find_open_fine(&self, borrowing_id: Uuid) -> AppResult<Option<Fine>> {
        let state = self.state.read().await;
        Ok(state
            .fines
            .iter()
            .find(|f| f.borrowing_id == borrowing_id && !f.is_settled())
            .cloned())
    }

    async fn list_fines(&self, user: Option<Uuid>, status: Option<SettlementKind>, page: Page) -> AppResult<(Vec<Fine>, i64)> {
        let state = self.state.read().await;
        let mut fines: Vec<Fine> = state
            .fines
            .iter()
            .filter(|f| user.map_or(true, |u| f.user_id == u))
            .filter(|f| status.map_or(true, |s| f.settlement.kind() == s))
            .cloned()
            .collect();
        fines.reverse();
        fines.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(fines, page))
    }

    async fn list_open_late_fines(&self) -> AppResult<Vec<Fine>> {
        let state = self.state.read().await;
        Ok(state
            .fines
            .iter()
            .filter(|f| f.fine_type == FineType::Late && !f.is_settled())
            .cloned()
            .collect())
    }

    async fn insert_fine(&self, fine: &Fine) -> AppResult<Fine> {
        let mut state = self.state.write().await;
        let write = FineWrite::Create(fine.clone());
        state.check_fine_write(&write)?;
        Ok(state.create_fine(fine))
    }

    async fn save_fine(&self, fine: &Fine) -> AppResult<Fine> {
        let mut state = self.state.write().await;
        let write = FineWrite::Update(fine.clone());
        state.check_fine_write(&write)?;
        state
            .update_fine(fine)
            .ok_or_else(|| AppError::NotFound("Fine not found".to_string()))
    }
}

#[async_trait]
impl SettingsRepository for MemoryRepository {
    async fn current_settings(&self) -> AppResult<Settings> {
        let mut state = self.state.write().await;
        Ok(state.settings.get_or_insert_with(Settings::default).clone())
    }
}

#[async_trait]
impl NotificationRepository for MemoryRepository {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.notifications.push(notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> AppResult<Option<Notification>> {
        let state = self.state.read().await;
        Ok(state.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn list_notifications(&self, user_id: Uuid, is_read: Option<bool>, page: Page) -> AppResult<(Vec<Notification>, i64)> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .filter(|n| is_read.map_or(true, |r| n.is_read == r))
            .cloned()
            .collect();
        notifications.reverse();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(notifications, page))
    }

    async fn mark_notification_read(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if let Some(n) = state.notifications.iter_mut().find(|n| n.id == id) {
            n.is_read = true;
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut count = 0;
        for n in state.notifications.iter_mut().filter(|n| n.user_id == user_id && !n.is_read) {
            n.is_read = true;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl FeedbackRepository for MemoryRepository {
    async fn insert_feedback(&self, feedback: &Feedback) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.feedback.push(feedback.clone());
        Ok(())
    }

    async fn get_feedback(&self, id: Uuid) -> AppResult<Option<Feedback>> {
        let state = self.state.read().await;
        Ok(state.feedback.iter().find(|f| f.id == id).cloned())
    }

    async fn list_feedback(&self, book_id: Option<Uuid>, page: Page) -> AppResult<(Vec<Feedback>, i64)> {
        let state = self.state.read().await;
        let mut feedback: Vec<Feedback> = state
            .feedback
            .iter()
            .filter(|f| book_id.map_or(true, |b| f.book_id == b))
            .cloned()
            .collect();
        feedback.reverse();
        feedback.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(feedback, page))
    }

    async fn delete_feedback(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let before = state.feedback.len();
        state.feedback.retain(|f| f.id != id);
        Ok(state.feedback.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn book(copies: i32) -> Book {
        let now = Utc::now();
        Book {
            id: Uuid::new_v4(),
            title: "Emma".to_string(),
            author: "Jane Austen".to_string(),
            category: "fiction".to_string(),
            code: Uuid::new_v4().to_string(),
            price: Decimal::from(80),
            total_copies: copies,
            available_copies: copies,
            description: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    async fn reader(repository: &MemoryRepository) -> User {
        let user = User::new(
            &format!("{}@example.com", Uuid::new_v4()),
            "Reader",
            "hash".to_string(),
            UserRole::User,
            Utc::now(),
        );
        repository.insert_user(&user).await.unwrap();
        user
    }

    fn borrowing_for(book_id: Uuid, user_id: Uuid) -> Borrowing {
        let now = Utc::now();
        Borrowing::new(book_id, Borrower::Individual(user_id), now, now + Duration::days(30))
    }

    #[tokio::test]
    async fn test_concurrent_borrows_never_oversell() {
        let repository = MemoryRepository::new();
        let book = book(3);
        repository.insert_book(&book).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let user = reader(&repository).await;
            let repository = repository.clone();
            let borrowing = borrowing_for(book.id, user.id);
            tasks.push(tokio::spawn(async move { repository.open_borrowing(&borrowing, 1).await }));
        }

        let mut opened = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => opened += 1,
                Err(AppError::BadRequest(msg)) => assert_eq!(msg, "No copies available"),
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(opened, 3);
        let stored = repository.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(stored.available_copies, 0);
    }

    #[tokio::test]
    async fn test_failed_guard_commits_nothing() {
        let repository = MemoryRepository::new();
        let book = book(2);
        repository.insert_book(&book).await.unwrap();
        let user = reader(&repository).await;

        repository.open_borrowing(&borrowing_for(book.id, user.id), 1).await.unwrap();
        let second = borrowing_for(book.id, user.id);
        let err = repository.open_borrowing(&second, 1).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Borrowing limit reached"));
        assert!(repository.get_borrowing(second.id).await.unwrap().is_none());
        let stored = repository.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(stored.available_copies, 1);
    }

    #[tokio::test]
    async fn test_overdue_with_rejected_fine_keeps_status() {
        let repository = MemoryRepository::new();
        let book = book(1);
        repository.insert_book(&book).await.unwrap();
        let user = reader(&repository).await;
        let borrowing = borrowing_for(book.id, user.id);
        repository.open_borrowing(&borrowing, 1).await.unwrap();

        let open = Fine::new(borrowing.id, user.id, FineType::Late, Utc::now());
        repository.insert_fine(&open).await.unwrap();
        let duplicate = Fine::new(borrowing.id, user.id, FineType::Late, Utc::now());
        let err = repository
            .mark_overdue(borrowing.id, &FineWrite::Create(duplicate))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let stored = repository.get_borrowing(borrowing.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BorrowingStatus::Borrowed);

        let marked = repository
            .mark_overdue(borrowing.id, &FineWrite::Update(open.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marked.id, open.id);
        let stored = repository.get_borrowing(borrowing.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BorrowingStatus::Overdue);
        assert_eq!(stored.fine_id, Some(open.id));

        let again = Fine::new(borrowing.id, user.id, FineType::Late, Utc::now());
        let skipped = repository.mark_overdue(borrowing.id, &FineWrite::Create(again)).await.unwrap();
        assert!(skipped.is_none());
    }

    #[tokio::test]
    async fn test_closure_with_stale_status_conflicts() {
        let repository = MemoryRepository::new();
        let book = book(1);
        repository.insert_book(&book).await.unwrap();
        let user = reader(&repository).await;
        let borrowing = borrowing_for(book.id, user.id);
        repository.open_borrowing(&borrowing, 1).await.unwrap();

        let mut returned = borrowing.clone();
        returned.status = BorrowingStatus::Returned;
        let closure = BorrowingClosure {
            borrowing: returned,
            expected_status: BorrowingStatus::Borrowed,
            inventory: InventoryChange::Restock,
            fine: None,
        };
        repository.close_borrowing(&closure).await.unwrap();

        let err = repository.close_borrowing(&closure).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let stored = repository.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(stored.available_copies, 1);
    }
}
