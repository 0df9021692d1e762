// Test helpers are intentionally partially used
#![allow(dead_code)]

use axum::{
    http::{StatusCode, Uri},
    routing::get,
    Json, Router,
};
use dependency_gateway::domain::{Dependency, ProxyRoute};
use dependency_gateway::{create_metrics, AppConfig, Gateway, MetricsPtr, ServerConfig};
use reqwest::Client;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

// ============================================================================
// Stub dependencies
// ============================================================================

/// Starts a stand-in catalogue/voting/recommendation backend on an ephemeral port.
pub async fn spawn_backend() -> SocketAddr {
    // ---
    let app = Router::new()
        .route(
            "/api/products",
            get(|| async { Json(json!([{ "id": 1, "name": "Crane" }])) }),
        )
        .route(
            "/api/origamis/{id}",
            get(|axum::extract::Path(id): axum::extract::Path<String>| async move {
                if id == "404" {
                    (StatusCode::NOT_FOUND, Json(json!({ "error": "no such origami" })))
                } else {
                    (StatusCode::OK, Json(json!({ "id": id, "votes": 3 })))
                }
            }),
        )
        .route("/health", get(|| async { "ok" }))
        .route(
            "/slow",
            get(|| async {
                sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Starts a backend that answers every request with its own request target.
pub async fn spawn_echo_backend() -> SocketAddr {
    // ---
    let app = Router::new().fallback(|uri: Uri| async move {
        uri.path_and_query()
            .map(|target| target.as_str().to_string())
            .unwrap_or_default()
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on, so connections are refused.
pub async fn refused_addr() -> SocketAddr {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn dependency(name: &str, addr: SocketAddr, timeout_ms: u64) -> Dependency {
    // ---
    Dependency {
        name: name.to_string(),
        base_uri: format!("http://{addr}"),
        timeout: Duration::from_millis(timeout_ms),
        health_path: "/health".to_string(),
        status_route: format!("/{name}-status"),
        non_2xx_reachable: true,
        retries: 0,
    }
}

pub fn config(dependencies: Vec<Dependency>, proxy_routes: Vec<ProxyRoute>) -> AppConfig {
    // ---
    AppConfig {
        server: ServerConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        },
        dependencies,
        proxy_routes,
        probe_interval: None,
    }
}

// ============================================================================
// Gateway under test
// ============================================================================

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub metrics: MetricsPtr,
}

impl TestServer {
    // ---
    pub async fn new(config: AppConfig) -> Self {
        // ---
        let metrics = create_metrics().expect("Should be able to create registry");
        let client = dependency_gateway::create_http_client().expect("Should build http client");
        let gateway = Gateway::new(&config, metrics.clone(), client)
            .expect("Should be able to create gateway");
        let _prober = gateway.spawn_prober();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Spawn the server in the background
        let app = gateway.into_router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start
        sleep(Duration::from_millis(100)).await;

        Self {
            addr,
            client: Client::new(),
            metrics,
        }
    }

    pub fn url(&self, path: &str) -> String {
        // ---
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        // ---
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send request")
    }
}
