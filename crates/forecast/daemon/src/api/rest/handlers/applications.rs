//! Application status handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use forecast_registry::ApplicationStatus;
use forecast_types::ApplicationName;

/// List every known application
pub async fn list_applications(State(state): State<AppState>) -> Json<Vec<ApplicationStatus>> {
    Json(state.registry().list().await)
}

/// Get one application by name
pub async fn get_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ApplicationStatus>> {
    state
        .registry()
        .status(&ApplicationName::new(name.as_str()))
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("application {}", name)))
}
