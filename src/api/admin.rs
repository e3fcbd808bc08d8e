//! Administrative endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, services::sweeper::SweepReport, AppState};

use super::AuthenticatedUser;

/// Run the overdue sweep now (admin)
#[utoipa::path(
    post,
    path = "/admin/sweeps",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Per-pass sweep report", body = SweepReport),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn run_sweep(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<SweepReport>> {
    claims.require_admin()?;

    tracing::info!("Manual sweep requested by {}", claims.user_id);
    let report = state.services.sweeper.run_all().await?;
    Ok(Json(report))
}
