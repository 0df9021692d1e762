//! Request instrumentation.
//!
//! [`instrument`] wraps every route and the fallback. It records one
//! observation per request into the request-duration histogram and the
//! request counter, labelled by method, route template and status code.
//! The panic handler below turns a handler panic into a 500 inside this
//! wrapper, so panicking requests are recorded like any other.

use crate::app_state::AppState;
use crate::handlers::GatewayError;
use crate::infrastructure::metrics::{track_http_request, MetricsPtr};
use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::time::Instant;
use uuid::Uuid;

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Status recorded when the caller goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

const REQUEST_ID: &str = "x-request-id";

/// Pending observation of one request.
///
/// Recording happens in [`finish`](Observation::finish) or, if the request
/// future is dropped first, in `Drop`. The `recorded` flag makes it
/// happen exactly once.
struct Observation {
    metrics: MetricsPtr,
    method: Method,
    route: String,
    start: Instant,
    recorded: bool,
}

impl Observation {
    fn finish(mut self, status: u16) {
        self.record(status);
    }

    fn record(&mut self, status: u16) {
        // ---
        if self.recorded {
            return;
        }
        self.recorded = true;

        let elapsed = self.start.elapsed();
        if let Err(err) =
            track_http_request(&self.metrics, self.method.as_str(), &self.route, status, elapsed)
        {
            tracing::error!(route = %self.route, "Failed to record request: {err}");
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.record(CLIENT_CLOSED_REQUEST);
    }
}

/// Middleware measuring and recording every inbound request.
pub async fn instrument(State(state): State<AppState>, request: Request, next: Next) -> Response {
    // ---
    let raw_path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let observation = Observation {
        metrics: state.metrics().clone(),
        method: request.method().clone(),
        route: route_label(&request),
        start: Instant::now(),
        recorded: false,
    };

    let mut response = next.run(request).await;

    let status = response.status().as_u16();
    tracing::debug!(
        method = %observation.method,
        path = %raw_path,
        route = %observation.route,
        status,
        duration_ms = observation.start.elapsed().as_millis() as u64,
        "Request processed"
    );
    observation.finish(status);

    if let Some(request_id) = request_id {
        response.headers_mut().insert(REQUEST_ID, request_id);
    }
    response
}

/// Matched route template, or [`UNMATCHED_ROUTE`]. Never the raw path.
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Converts a handler panic into a generic 500 response.
///
/// The panic message is logged, never returned.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    // ---
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "non-string panic payload".to_string()
    };

    GatewayError::Panic(detail).into_response()
}
