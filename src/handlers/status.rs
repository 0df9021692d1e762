use crate::app_state::AppState;
use crate::domain::{DependencyRequest, HealthSnapshot};
use crate::handlers::shared_types::GatewayError;
use axum::{
    extract::{MatchedPath, State},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: &'static str,
    message: String,
}

/// Live status of the dependency bound to the matched status route.
///
/// Probes the dependency's health path, which also updates the health
/// aggregator, and answers `200 OK` with `{ "status": "up"|"down", "message" }`.
#[tracing::instrument(skip_all, fields(route = %matched.as_str()))]
pub async fn dependency_status(
    State(state): State<AppState>,
    matched: MatchedPath,
) -> Result<Json<StatusResponse>, GatewayError> {
    // ---
    let dependency = state
        .status_dependency(matched.as_str())
        .ok_or_else(|| GatewayError::UnknownRoute(matched.as_str().to_string()))?;

    let outcome = state
        .probe()
        .call(
            Arc::clone(&dependency),
            DependencyRequest::get(dependency.health_path.clone()),
        )
        .await;

    let response = if outcome.is_reachable(dependency.non_2xx_reachable) {
        StatusResponse {
            status: "up",
            message: format!("{} Service is Online", dependency.display_name()),
        }
    } else {
        StatusResponse {
            status: "down",
            message: format!("{} Service is Offline", dependency.display_name()),
        }
    };

    Ok(Json(response))
}

/// Last known health of every dependency, without probing.
pub async fn service_status(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, HealthSnapshot>> {
    Json(state.health().status_all())
}
