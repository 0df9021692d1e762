use crate::app_state::AppState;
use crate::handlers::shared_types::GatewayError;
use crate::infrastructure::metrics::CONTENT_TYPE;
use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse};

/// Handler for the `/metrics` endpoint.
///
/// Snapshots the registry and renders it in the Prometheus text format.
/// Never depends on downstream state, so it cannot fail because a
/// dependency is down.
pub async fn metrics_handler(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    // ---
    let metrics_text = app_state.metrics().snapshot().encode()?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        metrics_text,
    ))
}
