//! Fine ledger: queries and settlement

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        fine::{FineQuery, UpdateFine},
        Actor, Fine, Notice, Page, Settlement, Severity,
    },
    repository::SharedRepository,
    services::notifier::Notifier,
};

#[derive(Clone)]
pub struct FinesService {
    repository: SharedRepository,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

/// Refuse changes to a settled fine, naming how it was settled
fn ensure_unsettled(fine: &Fine, action: &str) -> AppResult<()> {
    match fine.settlement {
        Settlement::Unpaid => Ok(()),
        Settlement::Paid { .. } if action == "pay" => {
            Err(AppError::BadRequest("Fine already paid".to_string()))
        }
        Settlement::Waived { .. } if action == "pay" => {
            Err(AppError::BadRequest("Fine already waived".to_string()))
        }
        Settlement::Paid { .. } => Err(AppError::BadRequest(format!("Cannot {} paid fine", action))),
        Settlement::Waived { .. } => {
            Err(AppError::BadRequest(format!("Cannot {} waived fine", action)))
        }
    }
}

impl FinesService {
    pub fn new(repository: SharedRepository, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            notifier,
            clock,
        }
    }

    async fn find(&self, id: Uuid) -> AppResult<Fine> {
        self.repository
            .get_fine(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Fine not found".to_string()))
    }

    fn check_owner(actor: Actor, fine: &Fine) -> AppResult<()> {
        if actor.is_admin() || fine.user_id == actor.user_id {
            Ok(())
        } else {
            Err(AppError::Authorization("Access denied".to_string()))
        }
    }

    async fn notify_payer(&self, fine: &Fine, title: &str, message: String, severity: Severity) {
        match self.repository.get_user(fine.user_id).await {
            Ok(Some(user)) => {
                self.notifier
                    .notify(Notice::new(user.id, &user.email, title, message, severity))
                    .await
            }
            Ok(None) => tracing::warn!("Payer {} of fine {} not found", fine.user_id, fine.id),
            Err(e) => tracing::warn!("Could not load payer of fine {}: {}", fine.id, e),
        }
    }

    /// Fines visible to the actor: all for admins, otherwise their own
    pub async fn list_fines(&self, actor: Actor, query: &FineQuery) -> AppResult<(Vec<Fine>, i64)> {
        let user = (!actor.is_admin()).then_some(actor.user_id);
        self.repository
            .list_fines(user, query.status, Page::new(query.page, query.per_page))
            .await
    }

    pub async fn get_fine(&self, actor: Actor, id: Uuid) -> AppResult<Fine> {
        let fine = self.find(id).await?;
        Self::check_owner(actor, &fine)?;
        Ok(fine)
    }

    pub async fn pay_fine(&self, actor: Actor, id: Uuid) -> AppResult<Fine> {
        let mut fine = self.find(id).await?;
        Self::check_owner(actor, &fine)?;
        ensure_unsettled(&fine, "pay")?;

        let now = self.clock.now();
        fine.settlement = Settlement::Paid { paid_date: now };
        fine.updated_at = now;
        let fine = self.repository.save_fine(&fine).await?;

        self.notify_payer(
            &fine,
            "Fine Paid",
            format!("Your fine of {} has been paid", fine.total_fine),
            Severity::Info,
        )
        .await;
        tracing::info!("Fine paid: {} by {}", id, actor.user_id);
        Ok(fine)
    }

    /// Forgive a fine; the amount owed is kept on the waiver record
    pub async fn waive_fine(&self, actor: Actor, id: Uuid) -> AppResult<Fine> {
        actor.require_admin()?;
        let mut fine = self.find(id).await?;
        ensure_unsettled(&fine, "waive")?;

        let now = self.clock.now();
        let owed = fine.total_fine;
        fine.set_late_fee(fine.days_late, Decimal::ZERO);
        fine.set_damage_fine(Decimal::ZERO);
        fine.set_missing_fine(Decimal::ZERO);
        fine.settlement = Settlement::Waived {
            waived_date: now,
            waived_amount: owed,
        };
        fine.updated_at = now;
        let fine = self.repository.save_fine(&fine).await?;

        self.notify_payer(
            &fine,
            "Fine Waived",
            format!("Your fine of {} has been waived", owed),
            Severity::Info,
        )
        .await;
        tracing::info!("Fine waived: {} by admin {}", id, actor.user_id);
        Ok(fine)
    }

    pub async fn update_fine(&self, actor: Actor, id: Uuid, data: UpdateFine) -> AppResult<Fine> {
        actor.require_admin()?;
        let mut fine = self.find(id).await?;
        ensure_unsettled(&fine, "update")?;

        for amount in [data.late_fee, data.damage_fine, data.missing_fine].into_iter().flatten() {
            if amount.is_sign_negative() {
                return Err(AppError::Validation("Fine amounts cannot be negative".to_string()));
            }
        }
        if let Some(late_fee) = data.late_fee {
            fine.set_late_fee(fine.days_late, late_fee);
        }
        if let Some(damage_fine) = data.damage_fine {
            fine.set_damage_fine(damage_fine);
        }
        if let Some(missing_fine) = data.missing_fine {
            fine.set_missing_fine(missing_fine);
        }
        fine.updated_at = self.clock.now();
        let fine = self.repository.save_fine(&fine).await?;

        self.notify_payer(
            &fine,
            "Fine Updated",
            format!("Your fine has been updated to {}", fine.total_fine),
            Severity::Warning,
        )
        .await;
        tracing::info!("Fine updated: {} by admin {}", id, actor.user_id);
        Ok(fine)
    }
}
