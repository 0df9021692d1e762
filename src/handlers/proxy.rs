use crate::app_state::AppState;
use crate::domain::{DependencyRequest, DependencyResponse, Failure, Outcome};
use crate::handlers::fallback::NOT_FOUND_BODY;
use crate::handlers::shared_types::{GatewayError, ProxyErrorBody};
use axum::{
    extract::{MatchedPath, Path, RawQuery, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Forwards a request to the dependency bound to the matched route.
///
/// - A 2xx reply is returned verbatim (status, body, content type).
/// - A non-2xx reply is also returned verbatim: the dependency answered,
///   so the caller sees its status.
/// - Timeouts, refused connections and transport errors become
///   `500 Internal Server Error` with `{ "error", "dependency", "backend" }`.
///
/// Unreachable outcomes, as judged by the dependency's non-2xx policy, are
/// retried up to its `retries` setting. Every attempt is reported to the
/// health aggregator. Path parameters of `.` or `..` answer the fallback 404.
#[tracing::instrument(skip_all, fields(route = %matched.as_str()))]
pub async fn proxy_handler(
    State(state): State<AppState>,
    matched: MatchedPath,
    Path(params): Path<HashMap<String, String>>,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    // ---
    let route = state
        .proxy_route(matched.as_str())
        .ok_or_else(|| GatewayError::UnknownRoute(matched.as_str().to_string()))?;
    let dependency = state
        .dependency(&route.dependency)
        .ok_or_else(|| GatewayError::UnknownDependency(route.dependency.clone()))?;

    let Some(path) = route.upstream_path(&params, query.as_deref()) else {
        tracing::warn!(dependency = %dependency.name, ?params, "Rejected dot segment in proxied path");
        return Ok((StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response());
    };
    let request = DependencyRequest::get(path);

    let mut outcome = state
        .probe()
        .call(Arc::clone(&dependency), request.clone())
        .await;
    let mut attempt = 0;
    while attempt < dependency.retries && !outcome.is_reachable(dependency.non_2xx_reachable) {
        attempt += 1;
        tracing::info!(dependency = %dependency.name, attempt, "Retrying dependency call");
        outcome = state
            .probe()
            .call(Arc::clone(&dependency), request.clone())
            .await;
    }

    let response = match outcome {
        Outcome::Success(reply) | Outcome::Failure(Failure::NonSuccessStatus(reply)) => {
            forward(reply)
        }
        Outcome::Failure(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProxyErrorBody {
                error: format!("Error fetching from {}: {failure}", dependency.name),
                dependency: dependency.name.clone(),
                backend: dependency.base_uri.clone(),
            }),
        )
            .into_response(),
    };

    Ok(response)
}

fn forward(reply: DependencyResponse) -> Response {
    // ---
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, reply.body).into_response();

    if let Some(content_type) = reply
        .content_type
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}
