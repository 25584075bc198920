//! Inbound bus bridge

use crate::api::rest::state::AppState;
use crate::dispatcher::{DispatchOutcome, Route};
use crate::error::{ApiError, ApiResult};
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Serialize;

/// Dispatch result returned to the bridge
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub address: String,
    pub route: Route,
    pub outcome: DispatchOutcome,
}

/// Feed one bus message to the dispatcher
pub async fn receive_message(
    State(state): State<AppState>,
    Path(address): Path<String>,
    body: Bytes,
) -> ApiResult<Json<DispatchResponse>> {
    let body = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(address = %address, error = %e, "Rejecting message with invalid JSON body");
            ApiError::BadRequest(format!("invalid JSON body: {}", e))
        })?
    };

    let route = state.dispatcher.route(&address);
    let outcome = state.dispatcher.dispatch(&address, body).await?;

    Ok(Json(DispatchResponse {
        address,
        route,
        outcome,
    }))
}
