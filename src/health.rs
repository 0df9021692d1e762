//! Per-dependency up/down tracking.
//!
//! Health is purely reactive: state changes only when a probe outcome is
//! reported, either from a proxied request or from the optional background
//! prober. A dependency that receives no traffic keeps its last state, however
//! old; `last_updated` tells callers how old that is.

use crate::domain::{DependencyStatus, HealthSnapshot, HealthState};
use crate::infrastructure::metrics::{set_dependency_up, MetricsPtr};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct HealthEntry {
    state: HealthState,
    last_updated: DateTime<Utc>,
}

/// Current health of every dependency, mirrored into the
/// `gateway_service_dependency_up` gauge.
pub struct HealthAggregator {
    entries: DashMap<String, HealthEntry>,
    known: Vec<String>,
    metrics: MetricsPtr,
}

/// Type alias for the shared aggregator.
pub type HealthPtr = Arc<HealthAggregator>;

impl HealthAggregator {
    /// Creates an aggregator. `known` dependencies are listed by
    /// [`status_all`](Self::status_all) even before their first report.
    pub fn new<I, S>(metrics: MetricsPtr, known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // ---
        HealthAggregator {
            entries: DashMap::new(),
            known: known.into_iter().map(Into::into).collect(),
            metrics,
        }
    }

    /// Records a probe outcome. Last write wins.
    ///
    /// The entry stays locked while the gauge is written, so concurrent
    /// reports for one dependency leave the entry and the gauge agreeing.
    pub fn report(&self, dependency: &str, reachable: bool) {
        // ---
        let current = HealthEntry {
            state: HealthState::from_reachable(reachable),
            last_updated: Utc::now(),
        };

        let previous = match self.entries.entry(dependency.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(current).state;
                self.publish(dependency, current.state);
                Some(previous)
            }
            Entry::Vacant(vacant) => {
                let _entry = vacant.insert(current);
                self.publish(dependency, current.state);
                None
            }
        };

        match (previous, current.state) {
            (None, state) => {
                tracing::info!(dependency, ?state, "First health report");
            }
            (Some(HealthState::Up), HealthState::Down) => {
                tracing::warn!(dependency, "Dependency went down");
            }
            (Some(HealthState::Down), HealthState::Up) => {
                tracing::info!(dependency, "Dependency recovered");
            }
            _ => {}
        }
    }

    /// Last reported status, or `Unknown` if never reported.
    pub fn status(&self, dependency: &str) -> DependencyStatus {
        // ---
        self.entries
            .get(dependency)
            .map(|entry| entry.state.into())
            .unwrap_or(DependencyStatus::Unknown)
    }

    /// Status of every known or reported dependency.
    pub fn status_all(&self) -> BTreeMap<String, HealthSnapshot> {
        // ---
        let mut all: BTreeMap<String, HealthSnapshot> = self
            .known
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    HealthSnapshot {
                        status: DependencyStatus::Unknown,
                        last_updated: None,
                    },
                )
            })
            .collect();

        for entry in self.entries.iter() {
            all.insert(
                entry.key().clone(),
                HealthSnapshot {
                    status: entry.state.into(),
                    last_updated: Some(entry.last_updated),
                },
            );
        }
        all
    }

    fn publish(&self, dependency: &str, state: HealthState) {
        if let Err(err) = set_dependency_up(&self.metrics, dependency, state.gauge_value()) {
            tracing::error!(dependency, "Failed to publish health gauge: {err}");
        }
    }
}
