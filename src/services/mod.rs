//! Business logic services

pub mod auth;
pub mod books;
pub mod borrowings;
pub mod email;
pub mod feedback;
pub mod fines;
pub mod groups;
pub mod notifications;
pub mod notifier;
pub mod policy;
pub mod settings;
pub mod sweeper;

use std::sync::Arc;

use crate::{
    clock::Clock,
    config::{AuthConfig, SweeperConfig},
    repository::SharedRepository,
};

use notifier::Notifier;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub books: books::BooksService,
    pub groups: groups::GroupsService,
    pub borrowings: borrowings::BorrowingsService,
    pub fines: fines::FinesService,
    pub sweeper: sweeper::SweeperService,
    pub settings: settings::SettingsService,
    pub notifications: notifications::NotificationsService,
    pub feedback: feedback::FeedbackService,
}

impl Services {
    /// Create all services over one repository, notifier and clock
    pub fn new(
        repository: SharedRepository,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        auth_config: AuthConfig,
        sweeper_config: &SweeperConfig,
    ) -> Self {
        Self {
            auth: auth::AuthService::new(repository.clone(), auth_config, clock.clone()),
            books: books::BooksService::new(repository.clone(), clock.clone()),
            groups: groups::GroupsService::new(repository.clone(), clock.clone()),
            borrowings: borrowings::BorrowingsService::new(repository.clone(), notifier.clone(), clock.clone()),
            fines: fines::FinesService::new(repository.clone(), notifier.clone(), clock.clone()),
            sweeper: sweeper::SweeperService::new(
                repository.clone(),
                notifier.clone(),
                clock.clone(),
                sweeper_config.reminder_window_days,
            ),
            settings: settings::SettingsService::new(repository.clone()),
            notifications: notifications::NotificationsService::new(repository.clone()),
            feedback: feedback::FeedbackService::new(repository, notifier, clock),
        }
    }
}
