use axum::http::StatusCode;

pub const NOT_FOUND_BODY: &str = "ERROR 404 - Not Found on This Server";

/// Answers every request no route accepted, including a known path hit
/// with an unsupported method.
pub async fn fallback_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}
