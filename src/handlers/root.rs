use crate::app_state::AppState;
use axum::{extract::State, response::IntoResponse};
use std::fmt::Write;

pub async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    let version = env!("CARGO_PKG_VERSION");
    let mut text = format!(
        r#"Dependency Gateway
Version: {version}

Available endpoints:
  - GET    /                    - This page
  - GET    /health              - Gateway liveness
  - GET    /metrics             - Request and dependency metrics
  - GET    /api/service-status  - Last known health of every dependency
"#
    );

    for dependency in state.dependencies() {
        let _ = writeln!(
            text,
            "  - GET    {:<20} - Live status of {}",
            dependency.status_route, dependency.name
        );
    }
    for route in state.proxy_routes() {
        let _ = writeln!(
            text,
            "  - GET    {:<20} - Proxied to {}{}",
            route.template, route.dependency, route.upstream
        );
    }

    text.push_str("\nDependencies:\n");
    for dependency in state.dependencies() {
        let _ = writeln!(
            text,
            "  - {} at {} (timeout {} ms)",
            dependency.name,
            dependency.base_uri,
            dependency.timeout.as_millis()
        );
    }

    text
}
