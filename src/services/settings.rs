//! Settings provider

use crate::{
    error::AppResult,
    models::Settings,
    repository::SharedRepository,
};

#[derive(Clone)]
pub struct SettingsService {
    repository: SharedRepository,
}

impl SettingsService {
    pub fn new(repository: SharedRepository) -> Self {
        Self { repository }
    }

    /// Current policy values, read fresh on every call
    pub async fn current(&self) -> AppResult<Settings> {
        self.repository.current_settings().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_defaults_created_on_first_access() {
        let service = SettingsService::new(Arc::new(MemoryRepository::new()));

        let settings = service.current().await.unwrap();

        assert_eq!(settings.individual_borrow_days, 30);
        assert_eq!(settings.group_borrow_days, 180);
        assert_eq!(settings.late_fee_per_day, Decimal::from(50));
        assert_eq!(settings.missing_fine_multiplier, Decimal::from(2));
        assert_eq!(settings.max_books_per_user, 1);
        assert_eq!(service.current().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_stored_settings_win_over_defaults() {
        let custom = Settings {
            late_fee_per_day: Decimal::from(10),
            max_books_per_user: 4,
            ..Settings::default()
        };
        let service = SettingsService::new(Arc::new(MemoryRepository::with_settings(custom.clone())));

        assert_eq!(service.current().await.unwrap(), custom);
    }
}
