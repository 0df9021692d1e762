use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A backend service the gateway calls on behalf of inbound requests.
///
/// Built once from configuration and shared read-only; the mutable health
/// state for a dependency lives in the health aggregator, never here.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Logical name, e.g. `catalogue`. Used as the `service` metric label.
    pub name: String,

    /// Base address without a trailing slash, e.g. `http://catalogue:5000`.
    pub base_uri: String,

    /// Upper bound for a single outbound call. Never zero.
    pub timeout: Duration,

    /// Path probed by the status route and the background prober.
    pub health_path: String,

    /// Inbound route that reports this dependency's live status.
    pub status_route: String,

    /// Whether a well-formed non-2xx reply proves the dependency is reachable.
    pub non_2xx_reachable: bool,

    /// Extra attempts the proxy handler makes after an unreachable outcome.
    pub retries: u32,
}

impl Dependency {
    /// Joins the base address with a request path.
    pub fn url_for(&self, path_and_query: &str) -> String {
        // ---
        let base = self.base_uri.trim_end_matches('/');
        if path_and_query.starts_with('/') {
            format!("{base}{path_and_query}")
        } else {
            format!("{base}/{path_and_query}")
        }
    }

    /// Human-facing name used in status messages, e.g. `Catalogue`.
    pub fn display_name(&self) -> String {
        // ---
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Last reported reachability of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Up,
    Down,
}

impl HealthState {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            HealthState::Up
        } else {
            HealthState::Down
        }
    }

    /// Gauge value exported for this state.
    pub fn gauge_value(self) -> f64 {
        match self {
            HealthState::Up => 1.0,
            HealthState::Down => 0.0,
        }
    }
}

/// Answer of a status query: a dependency that was never reported is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    Up,
    Down,
    Unknown,
}

impl From<HealthState> for DependencyStatus {
    fn from(state: HealthState) -> Self {
        match state {
            HealthState::Up => DependencyStatus::Up,
            HealthState::Down => DependencyStatus::Down,
        }
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyStatus::Up => "up",
            DependencyStatus::Down => "down",
            DependencyStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Point-in-time health of one dependency as exposed by `status_all`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub status: DependencyStatus,
    pub last_updated: Option<DateTime<Utc>>,
}
