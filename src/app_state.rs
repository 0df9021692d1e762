//! Application state management.
//!
//! This module defines the context object passed to every handler and to
//! the instrumentation middleware via the `State` extractor. It owns the
//! metric registry, the health aggregator, the probe client and the
//! read-only dependency and proxy tables. Nothing here is a process global:
//! each router gets the state it was built with, so tests can run isolated
//! gateways side by side.

use crate::config::AppConfig;
use crate::domain::{Dependency, DependencyClientPtr, ProxyRoute};
use crate::health::{HealthAggregator, HealthPtr};
use crate::infrastructure::metrics::MetricsPtr;
use crate::probe::ProbeClient;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared gateway state passed to all Axum handlers.
///
/// # Design Principles
///
/// - **Dependency Inversion**: the probe client depends on the
///   `DependencyClient` trait, not on reqwest.
/// - **Immutable After Initialization**: the tables are built once at
///   startup. Only the registry and the health aggregator change, and they
///   synchronise internally.
/// - **Cheap Cloning**: everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Metric registry read by `/metrics` and written by the middleware.
    metrics: MetricsPtr,

    /// Per-dependency up/down state.
    health: HealthPtr,

    /// Outbound caller that reports every outcome to `health`.
    probe: ProbeClient,

    /// Dependencies by name, plus configuration order for listings.
    dependencies: Arc<HashMap<String, Arc<Dependency>>>,
    dependency_order: Arc<Vec<String>>,

    /// Proxy table keyed by inbound route template.
    proxy_routes: Arc<HashMap<String, ProxyRoute>>,

    /// Dependency name keyed by its status route.
    status_routes: Arc<HashMap<String, String>>,
}

impl AppState {
    // ---

    pub fn new(config: &AppConfig, metrics: MetricsPtr, client: DependencyClientPtr) -> Self {
        // ---
        let health: HealthPtr = Arc::new(HealthAggregator::new(
            Arc::clone(&metrics),
            config.dependencies.iter().map(|dep| dep.name.clone()),
        ));
        let probe = ProbeClient::new(client, Arc::clone(&health), Arc::clone(&metrics));

        let dependencies = config
            .dependencies
            .iter()
            .map(|dep| (dep.name.clone(), Arc::new(dep.clone())))
            .collect();
        let dependency_order = config
            .dependencies
            .iter()
            .map(|dep| dep.name.clone())
            .collect();
        let proxy_routes = config
            .proxy_routes
            .iter()
            .map(|route| (route.template.clone(), route.clone()))
            .collect();
        let status_routes = config
            .dependencies
            .iter()
            .map(|dep| (dep.status_route.clone(), dep.name.clone()))
            .collect();

        AppState {
            metrics,
            health,
            probe,
            dependencies: Arc::new(dependencies),
            dependency_order: Arc::new(dependency_order),
            proxy_routes: Arc::new(proxy_routes),
            status_routes: Arc::new(status_routes),
        }
    }

    /// Get a reference to the metric registry.
    pub(crate) fn metrics(&self) -> &MetricsPtr {
        &self.metrics
    }

    /// Get a reference to the health aggregator.
    pub(crate) fn health(&self) -> &HealthPtr {
        &self.health
    }

    pub(crate) fn probe(&self) -> &ProbeClient {
        &self.probe
    }

    pub(crate) fn dependency(&self, name: &str) -> Option<Arc<Dependency>> {
        self.dependencies.get(name).cloned()
    }

    /// Dependencies in configuration order.
    pub(crate) fn dependencies(&self) -> Vec<Arc<Dependency>> {
        // ---
        self.dependency_order
            .iter()
            .filter_map(|name| self.dependency(name))
            .collect()
    }

    pub(crate) fn proxy_route(&self, template: &str) -> Option<&ProxyRoute> {
        self.proxy_routes.get(template)
    }

    /// Proxy routes sorted by template.
    pub(crate) fn proxy_routes(&self) -> Vec<&ProxyRoute> {
        let mut routes: Vec<&ProxyRoute> = self.proxy_routes.values().collect();
        routes.sort_by(|a, b| a.template.cmp(&b.template));
        routes
    }

    /// Dependency served by a status route.
    pub(crate) fn status_dependency(&self, route: &str) -> Option<Arc<Dependency>> {
        self.status_routes
            .get(route)
            .and_then(|name| self.dependency(name))
    }
}
