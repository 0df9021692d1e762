//! Outbound calls to dependencies, with health reporting.
//!
//! [`ProbeClient::call`] runs each call on its own task, so the outcome is
//! reported to the health aggregator even when the inbound request that
//! triggered it is dropped. The call is bounded by the dependency's timeout
//! whatever [`DependencyClient`] is plugged in, and a panicking client is
//! classified as a transport error. The client never retries.
//!
//! [`DependencyClient`]: crate::domain::DependencyClient

use crate::domain::{Dependency, DependencyClientPtr, DependencyRequest, Failure, Outcome};
use crate::health::HealthPtr;
use crate::infrastructure::metrics::{increment_dependency_call, MetricsPtr};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone)]
pub struct ProbeClient {
    client: DependencyClientPtr,
    health: HealthPtr,
    metrics: MetricsPtr,
}

impl ProbeClient {
    // ---
    pub fn new(client: DependencyClientPtr, health: HealthPtr, metrics: MetricsPtr) -> Self {
        ProbeClient {
            client,
            health,
            metrics,
        }
    }

    /// Calls `dependency` and reports reachability exactly once.
    pub async fn call(&self, dependency: Arc<Dependency>, request: DependencyRequest) -> Outcome {
        // ---
        let probe = self.clone();
        let name = dependency.name.clone();
        let task =
            tokio::spawn(async move { probe.call_and_report(&dependency, &request).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(dependency = %name, "Dependency call task failed: {err}");
                Outcome::Failure(Failure::Transport(format!("call aborted: {err}")))
            }
        }
    }

    async fn call_and_report(&self, dependency: &Dependency, request: &DependencyRequest) -> Outcome {
        // ---
        let call = AssertUnwindSafe(self.client.call(dependency, request)).catch_unwind();

        let outcome = match tokio::time::timeout(dependency.timeout, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_panic)) => {
                tracing::error!(dependency = %dependency.name, "Dependency client panicked");
                Outcome::Failure(Failure::Transport("dependency client panicked".to_string()))
            }
            Err(_elapsed) => Outcome::Failure(Failure::Timeout),
        };

        let reachable = outcome.is_reachable(dependency.non_2xx_reachable);
        self.health.report(&dependency.name, reachable);

        if let Err(err) = increment_dependency_call(&self.metrics, &dependency.name, outcome.label()) {
            tracing::error!(dependency = %dependency.name, "Failed to count dependency call: {err}");
        }

        match &outcome {
            Outcome::Success(response) => tracing::debug!(
                dependency = %dependency.name,
                path = %request.path_and_query,
                status = response.status,
                "Dependency call succeeded"
            ),
            Outcome::Failure(failure) => tracing::warn!(
                dependency = %dependency.name,
                path = %request.path_and_query,
                reason = failure.reason().as_str(),
                reachable,
                "Dependency call failed: {failure}"
            ),
        }

        outcome
    }
}

/// Starts a task that probes every dependency's health path each `interval`.
///
/// Reports flow through the same [`ProbeClient`], so this only adds
/// freshness for dependencies that see no proxied traffic.
pub fn spawn_prober(
    probe: ProbeClient,
    dependencies: Vec<Arc<Dependency>>,
    interval: Duration,
) -> JoinHandle<()> {
    // ---
    tracing::info!(
        interval_secs = interval.as_secs(),
        dependencies = dependencies.len(),
        "Starting background prober"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let probes = dependencies.iter().map(|dependency| {
                probe.call(
                    Arc::clone(dependency),
                    DependencyRequest::get(dependency.health_path.clone()),
                )
            });
            futures::future::join_all(probes).await;
        }
    })
}
