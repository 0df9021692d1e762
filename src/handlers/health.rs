use axum::Json;

#[derive(serde::Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// Liveness of the gateway process itself.
///
/// Always `200 OK` with `{ "status": "healthy" }`; dependency health is
/// reported by the status routes and `/api/service-status` instead.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}
