use crate::domain::MetricError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic error body: `{ "error": <message> }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error body for a failed proxy call, naming the dependency that failed.
#[derive(Debug, Serialize)]
pub struct ProxyErrorBody {
    pub error: String,
    pub dependency: String,
    pub backend: String,
}

/// Faults inside the gateway's own handlers.
///
/// Every variant becomes a 500 with a generic body; the detail is only
/// logged.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no handler binding for route `{0}`")]
    UnknownRoute(String),

    #[error("route refers to unconfigured dependency `{0}`")]
    UnknownDependency(String),

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Metrics(#[from] MetricError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // ---
        tracing::error!("Request failed: {self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "internal server error".to_string(),
            }),
        )
            .into_response()
    }
}
