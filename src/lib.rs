// src/lib.rs
use anyhow::Result;
use app_state::AppState;
use axum::{middleware as axum_middleware, routing::get, Router};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tracing_subscriber::EnvFilter;

use handlers::{
    dependency_status, fallback_handler, health_check, metrics_handler, proxy_handler,
    root_handler, service_status,
};

// Public exports (visible outside this module)
pub mod domain;
pub mod infrastructure;

// Internal-only exports (sibling access within this module)
mod app_state;
mod config;
mod handlers;
mod health;
mod middleware;
mod probe;

pub use config::*;
pub use handlers::{ErrorBody, GatewayError, ProxyErrorBody, NOT_FOUND_BODY};
pub use health::{HealthAggregator, HealthPtr};
pub use middleware::{CLIENT_CLOSED_REQUEST, UNMATCHED_ROUTE};
pub use probe::{spawn_prober, ProbeClient};

// Publicly expose the infrastructure creation functions
pub use infrastructure::metrics::MetricsPtr;
pub use infrastructure::{create_http_client, create_metrics};

use domain::DependencyClientPtr;

/// Initializes the global tracing subscriber.
///
/// Honours `RUST_LOG`, defaulting to `info`. Ignores the call if a
/// subscriber is already installed.
pub fn init_tracing() {
    // ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().ok();
}

/// A fully wired gateway: router plus the state it shares with the
/// optional background prober.
pub struct Gateway {
    router: Router,
    state: AppState,
    probe_interval: Option<Duration>,
}

impl Gateway {
    /// Wires a gateway from configuration and explicit collaborators.
    ///
    /// # Errors
    /// Fails if the configuration is inconsistent or the route table cannot
    /// be built.
    pub fn new(config: &AppConfig, metrics: MetricsPtr, client: DependencyClientPtr) -> Result<Self> {
        // ---
        init_tracing();
        config.validate()?;

        let state = AppState::new(config, metrics, client);
        let router = build_router(state.clone())?;

        Ok(Gateway {
            router,
            state,
            probe_interval: config.probe_interval,
        })
    }

    /// Wires a gateway with a fresh metric registry and the HTTP client.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config, create_metrics()?, create_http_client()?)
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// The registry the gateway records into.
    pub fn metrics(&self) -> MetricsPtr {
        self.state.metrics().clone()
    }

    /// The aggregator the gateway reports dependency health into.
    pub fn health(&self) -> HealthPtr {
        self.state.health().clone()
    }

    /// Starts the background prober if an interval is configured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_prober(&self) -> Option<JoinHandle<()>> {
        // ---
        self.probe_interval.map(|interval| {
            spawn_prober(
                self.state.probe().clone(),
                self.state.dependencies(),
                interval,
            )
        })
    }
}

/// Build the HTTP router for the given configuration.
pub fn create_router(config: &AppConfig) -> Result<Router> {
    Ok(Gateway::from_config(config)?.into_router())
}

fn build_router(state: AppState) -> Result<Router> {
    // ---
    let status_routes: Vec<String> = state
        .dependencies()
        .iter()
        .map(|dep| dep.status_route.clone())
        .collect();
    let proxy_routes: Vec<String> = state
        .proxy_routes()
        .iter()
        .map(|route| route.template.clone())
        .collect();

    // axum panics on malformed or conflicting templates; surface that as a startup error.
    let routed = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let mut router: Router<AppState> = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_handler))
            .route("/api/service-status", get(service_status));

        for route in &status_routes {
            router = router.route(route, get(dependency_status));
        }
        for route in &proxy_routes {
            router = router.route(route, get(proxy_handler));
        }

        router
            .fallback(fallback_handler)
            .method_not_allowed_fallback(fallback_handler)
    }))
    .map_err(|_| anyhow::anyhow!("Invalid route table: {status_routes:?} {proxy_routes:?}"))?;

    let router = routed
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::instrument,
        ))
        .with_state(state);

    Ok(router)
}

#[cfg(test)]
mod tests {
    // ---

    use super::*;
    use crate::app_state::tests::test_config;
    use crate::domain::{DependencyResponse, Failure, Labels};
    use crate::infrastructure::metrics::{DEPENDENCY_CALLS_TOTAL, DEPENDENCY_UP};
    use crate::probe::tests::StubClient;
    use axum::body::Bytes;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request as HttpRequest, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn gateway(client: StubClient) -> Gateway {
        Gateway::new(&test_config(), create_metrics().unwrap(), Arc::new(client)).unwrap()
    }

    /// Gateway whose catalogue dependency is retried `retries` times.
    fn retrying_gateway(client: StubClient, retries: u32, non_2xx_reachable: bool) -> Gateway {
        // ---
        let mut config = test_config();
        let catalogue = config
            .dependencies
            .iter_mut()
            .find(|dep| dep.name == "catalogue")
            .unwrap();
        catalogue.retries = retries;
        catalogue.non_2xx_reachable = non_2xx_reachable;
        Gateway::new(&config, create_metrics().unwrap(), Arc::new(client)).unwrap()
    }

    fn catalogue_calls(gateway: &Gateway, outcome: &str) -> u64 {
        let labels = Labels::new([("service", "catalogue"), ("outcome", outcome)]);
        gateway
            .metrics()
            .snapshot()
            .counter(DEPENDENCY_CALLS_TOTAL, &labels)
            .unwrap_or(0)
    }

    fn unavailable() -> Failure {
        Failure::NonSuccessStatus(DependencyResponse {
            status: 503,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(br#"{"error":"warming up"}"#),
        })
    }

    async fn get(gateway: &Gateway, uri: &str) -> (StatusCode, String) {
        // ---
        let response = gateway
            .router()
            .oneshot(HttpRequest::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn proxies_success_verbatim() {
        // ---
        let gateway = gateway(StubClient::Reply(200, r#"[{"id":1}]"#));

        let (status, body) = get(&gateway, "/api/products").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"[{"id":1}]"#);
        assert_eq!(
            gateway.health().status("catalogue"),
            crate::domain::DependencyStatus::Up
        );
    }

    #[tokio::test]
    async fn forwards_non_success_status() {
        // ---
        let gateway = gateway(StubClient::Reply(404, r#"{"error":"no such origami"}"#));

        let (status, body) = get(&gateway, "/api/origamis/42").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("no such origami"));
    }

    #[tokio::test]
    async fn unreachable_dependency_yields_500_with_error_field() {
        // ---
        let gateway = gateway(StubClient::Fail(Failure::ConnectionRefused(
            "connection refused".to_string(),
        )));

        let (status, body) = get(&gateway, "/api/products").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("catalogue"));
        assert_eq!(json["dependency"], "catalogue");

        let snapshot = gateway.metrics().snapshot();
        let labels = Labels::new([("service", "catalogue")]);
        assert_eq!(snapshot.gauge(DEPENDENCY_UP, &labels), Some(0.0));
    }

    #[tokio::test]
    async fn stalled_dependency_times_out() {
        // ---
        let gateway = gateway(StubClient::Stall);

        let (status, body) = get(&gateway, "/api/products").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("error"));
    }

    #[tokio::test]
    async fn status_route_reports_down_then_metrics_show_zero() {
        // ---
        let gateway = gateway(StubClient::Fail(Failure::Timeout));

        let (status, body) = get(&gateway, "/catalogue-status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "down");
        assert_eq!(json["message"], "Catalogue Service is Offline");

        let (status, body) = get(&gateway, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"gateway_service_dependency_up{service="catalogue"} 0"#));
    }

    #[tokio::test]
    async fn status_route_reports_up() {
        // ---
        let gateway = gateway(StubClient::Reply(200, "ok"));

        let (_, body) = get(&gateway, "/voting-status").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["status"], "up");
        assert_eq!(json["message"], "Voting Service is Online");
    }

    #[tokio::test]
    async fn service_status_lists_every_dependency() {
        // ---
        let gateway = gateway(StubClient::Reply(200, "ok"));
        let _ = get(&gateway, "/api/products").await;

        let (status, body) = get(&gateway, "/api/service-status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["catalogue"]["status"], "up");
        assert!(json["catalogue"]["last_updated"].is_string());
        assert_eq!(json["voting"]["status"], "unknown");
    }

    #[tokio::test]
    async fn unknown_path_and_wrong_method_get_plain_404() {
        // ---
        let gateway = gateway(StubClient::Reply(200, "ok"));

        let (status, body) = get(&gateway, "/no/such/thing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, NOT_FOUND_BODY);

        let response = gateway
            .router()
            .oneshot(
                HttpRequest::post("/api/products")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_and_root_are_served() {
        // ---
        let gateway = gateway(StubClient::Reply(200, "ok"));

        let (status, body) = get(&gateway, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));

        let (status, body) = get(&gateway, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/catalogue-status"));
        assert!(body.contains("/api/origamis/{id}"));
    }

    #[test]
    fn rejects_invalid_configuration() {
        // ---
        let mut config = test_config();
        config.proxy_routes.push(crate::domain::ProxyRoute::new(
            "/api/things",
            "missing",
            "/things",
        ));

        let result = Gateway::new(
            &config,
            create_metrics().unwrap(),
            Arc::new(StubClient::Reply(200, "ok")),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn retries_refused_calls_until_success() {
        // ---
        let refused = Failure::ConnectionRefused("connection refused".to_string());
        let gateway = retrying_gateway(StubClient::fail_then_reply(2, refused, (200, "[]")), 2, true);

        let (status, body) = get(&gateway, "/api/products").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
        assert_eq!(catalogue_calls(&gateway, "connection_refused"), 2);
        assert_eq!(catalogue_calls(&gateway, "success"), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_yield_500() {
        // ---
        let refused = Failure::ConnectionRefused("connection refused".to_string());
        let gateway = retrying_gateway(StubClient::fail_then_reply(5, refused, (200, "[]")), 2, true);

        let (status, body) = get(&gateway, "/api/products").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("catalogue"));
        assert_eq!(catalogue_calls(&gateway, "connection_refused"), 3);
        assert_eq!(catalogue_calls(&gateway, "success"), 0);
    }

    #[tokio::test]
    async fn non_2xx_is_retried_when_counted_as_down() {
        // ---
        let gateway = retrying_gateway(StubClient::fail_then_reply(1, unavailable(), (200, "[]")), 1, false);

        let (status, body) = get(&gateway, "/api/products").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
        assert_eq!(catalogue_calls(&gateway, "non_2xx_status"), 1);
        assert_eq!(catalogue_calls(&gateway, "success"), 1);
    }

    #[tokio::test]
    async fn non_2xx_is_forwarded_without_retry_when_reachable() {
        // ---
        let gateway = retrying_gateway(StubClient::fail_then_reply(1, unavailable(), (200, "[]")), 1, true);

        let (status, body) = get(&gateway, "/api/products").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("warming up"));
        assert_eq!(catalogue_calls(&gateway, "non_2xx_status"), 1);
        assert_eq!(catalogue_calls(&gateway, "success"), 0);
    }

    #[tokio::test]
    async fn dot_segment_params_are_not_forwarded() {
        // ---
        let gateway = gateway(StubClient::Reply(200, "ok"));

        for uri in ["/api/origamis/%2E%2E", "/api/origamis/%2e"] {
            let (status, body) = get(&gateway, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, NOT_FOUND_BODY);
        }

        let labels = Labels::new([("service", "voting"), ("outcome", "success")]);
        let snapshot = gateway.metrics().snapshot();
        assert_eq!(snapshot.counter(DEPENDENCY_CALLS_TOTAL, &labels), None);
    }
}
