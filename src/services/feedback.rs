//! Reader feedback on books

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        feedback::{CreateFeedback, FeedbackQuery},
        Actor, Feedback, Notice, Page, Severity,
    },
    repository::SharedRepository,
    services::notifier::Notifier,
};

#[derive(Clone)]
pub struct FeedbackService {
    repository: SharedRepository,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl FeedbackService {
    pub fn new(repository: SharedRepository, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            notifier,
            clock,
        }
    }

    async fn find(&self, id: Uuid) -> AppResult<Feedback> {
        self.repository
            .get_feedback(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Feedback not found".to_string()))
    }

    fn check_author(actor: Actor, feedback: &Feedback) -> AppResult<()> {
        if actor.is_admin() || feedback.user_id == actor.user_id {
            Ok(())
        } else {
            Err(AppError::Authorization("Access denied".to_string()))
        }
    }

    async fn notify_author(&self, user_id: Uuid, title: &str, message: String) {
        match self.repository.get_user(user_id).await {
            Ok(Some(user)) => {
                self.notifier
                    .notify(Notice::new(user.id, &user.email, title, message, Severity::Info))
                    .await
            }
            Ok(None) => tracing::warn!("Feedback author {} not found", user_id),
            Err(e) => tracing::warn!("Could not load feedback author {}: {}", user_id, e),
        }
    }

    pub async fn create_feedback(&self, actor: Actor, data: CreateFeedback) -> AppResult<Feedback> {
        data.validate()?;
        let book = self
            .repository
            .get_book(data.book_id)
            .await?
            .filter(|b| !b.is_deleted)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let feedback = Feedback {
            id: Uuid::new_v4(),
            user_id: actor.user_id,
            book_id: book.id,
            title: data.title,
            comment: data.comment,
            rating: data.rating,
            created_at: self.clock.now(),
        };
        self.repository.insert_feedback(&feedback).await?;

        self.notify_author(
            actor.user_id,
            "Feedback Received",
            format!("Thank you for your feedback on {}.", book.title),
        )
        .await;
        tracing::info!("Feedback created: {} on book {}", feedback.id, book.id);
        Ok(feedback)
    }

    pub async fn list_feedback(&self, query: &FeedbackQuery) -> AppResult<(Vec<Feedback>, i64)> {
        self.repository
            .list_feedback(query.book_id, Page::new(query.page, query.per_page))
            .await
    }

    pub async fn get_feedback(&self, actor: Actor, id: Uuid) -> AppResult<Feedback> {
        let feedback = self.find(id).await?;
        Self::check_author(actor, &feedback)?;
        Ok(feedback)
    }

    pub async fn delete_feedback(&self, actor: Actor, id: Uuid) -> AppResult<()> {
        let feedback = self.find(id).await?;
        Self::check_author(actor, &feedback)?;
        if !self.repository.delete_feedback(id).await? {
            return Err(AppError::NotFound("Feedback not found".to_string()));
        }

        self.notify_author(
            feedback.user_id,
            "Feedback Deleted",
            format!("Your feedback \"{}\" has been deleted.", feedback.title),
        )
        .await;
        tracing::info!("Feedback deleted: {} by {}", id, actor.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::SystemClock,
        models::{Book, User, UserRole},
        repository::{BookRepository, MemoryRepository, UserRepository},
        services::notifier::MockNotifier,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

    async fn setup(notifier: MockNotifier) -> (FeedbackService, Uuid, Uuid) {
        let repository = Arc::new(MemoryRepository::new());
        let author = User::new("reader@example.com", "Reader", "hash".to_string(), UserRole::User, Utc::now());
        repository.insert_user(&author).await.unwrap();
        let book = Book {
            id: Uuid::new_v4(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            category: "fiction".to_string(),
            code: "978-0441013593".to_string(),
            price: Decimal::from(100),
            total_copies: 1,
            available_copies: 1,
            description: None,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repository.insert_book(&book).await.unwrap();

        let service = FeedbackService::new(repository, Arc::new(notifier), Arc::new(SystemClock));
        (service, author.id, book.id)
    }

    fn review(book_id: Uuid, rating: i16) -> CreateFeedback {
        CreateFeedback {
            book_id,
            title: "A classic".to_string(),
            comment: "Worth every page of it.".to_string(),
            rating,
        }
    }

    #[tokio::test]
    async fn test_create_and_delete_notify_author() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(2).returning(|_| ());
        let (service, author, book) = setup(notifier).await;

        let feedback = service.create_feedback(Actor::user(author), review(book, 5)).await.unwrap();
        assert_eq!(feedback.rating, 5);

        let err = service
            .delete_feedback(Actor::user(Uuid::new_v4()), feedback.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        service.delete_feedback(Actor::user(author), feedback.id).await.unwrap();
        let (remaining, _) = service.list_feedback(&FeedbackQuery::default()).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_rating_out_of_range() {
        let (service, author, book) = setup(MockNotifier::new()).await;
        let err = service.create_feedback(Actor::user(author), review(book, 6)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_book_not_found() {
        let (service, author, _) = setup(MockNotifier::new()).await;
        let err = service
            .create_feedback(Actor::user(author), review(Uuid::new_v4(), 4))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
