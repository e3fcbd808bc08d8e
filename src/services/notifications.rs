//! In-app notification inbox

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{notification::NotificationQuery, Actor, Notification, Page},
    repository::SharedRepository,
};

#[derive(Clone)]
pub struct NotificationsService {
    repository: SharedRepository,
}

impl NotificationsService {
    pub fn new(repository: SharedRepository) -> Self {
        Self { repository }
    }

    /// The caller's notifications, newest first
    pub async fn list_notifications(&self, actor: Actor, query: &NotificationQuery) -> AppResult<(Vec<Notification>, i64)> {
        self.repository
            .list_notifications(actor.user_id, query.is_read, Page::new(query.page, query.per_page))
            .await
    }

    pub async fn mark_as_read(&self, actor: Actor, id: Uuid) -> AppResult<Notification> {
        let notification = self
            .repository
            .get_notification(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;
        if notification.user_id != actor.user_id {
            return Err(AppError::Authorization("Access denied".to_string()));
        }

        self.repository.mark_notification_read(id).await?;
        Ok(Notification {
            is_read: true,
            ..notification
        })
    }

    /// Returns how many notifications changed
    pub async fn mark_all_as_read(&self, actor: Actor) -> AppResult<u64> {
        let count = self.repository.mark_all_notifications_read(actor.user_id).await?;
        tracing::debug!("Marked {} notifications read for {}", count, actor.user_id);
        Ok(count)
    }
}
