//! Notification delivery: in-app record plus optional email
//!
//! Delivery is best-effort. Failures are logged and never reach the caller.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    clock::Clock,
    models::{Notice, Notification},
    repository::SharedRepository,
    services::email::EmailService,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: Notice);
}

/// Stores the notice in-app and, when email is enabled, mails it in the background
#[derive(Clone)]
pub struct DispatchNotifier {
    repository: SharedRepository,
    email: Option<EmailService>,
    clock: Arc<dyn Clock>,
}

impl DispatchNotifier {
    pub fn new(repository: SharedRepository, email: Option<EmailService>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, email, clock }
    }
}

#[async_trait]
impl Notifier for DispatchNotifier {
    async fn notify(&self, notice: Notice) {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: notice.user_id,
            title: notice.title.clone(),
            message: notice.message.clone(),
            severity: notice.severity,
            is_read: false,
            created_at: self.clock.now(),
        };

        match self.repository.insert_notification(&notification).await {
            Ok(()) => tracing::debug!("Notification {} stored for user {}", notification.id, notice.user_id),
            Err(e) => tracing::warn!("In-app notification for user {} failed: {}", notice.user_id, e),
        }

        if let Some(email) = self.email.clone() {
            tokio::spawn(async move {
                if let Err(e) = email.send_notice(&notice).await {
                    tracing::warn!("Email to {} failed: {}", notice.email, e);
                }
            });
        }
    }
}
