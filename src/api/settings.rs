//! Settings endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, models::Settings, AppState};

/// Current borrowing and fine policy
#[utoipa::path(
    get,
    path = "/settings",
    tag = "settings",
    responses(
        (status = 200, description = "Current settings", body = Settings)
    )
)]
pub async fn get_settings(State(state): State<AppState>) -> AppResult<Json<Settings>> {
    let settings = state.services.settings.current().await?;
    Ok(Json(settings))
}
