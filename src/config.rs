// src/config.rs

//! Gateway configuration loaded from environment variables.
//!
//! This module defines all startup-time configuration for the gateway:
//! the listening socket, the dependency table and the proxy route table.
//! Configuration is validated eagerly and failures are treated as
//! deployment errors rather than recoverable runtime conditions.
//!
//! Per-dependency keys use the upper-cased dependency name as prefix, with
//! `-` replaced by `_`: dependency `catalogue` reads `CATALOGUE_BASE_URI`,
//! `CATALOGUE_TIMEOUT_MS` and so on.

use crate::domain::{Dependency, ProxyRoute};
use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;

// ============================================================
// Local macros (config-only, intentionally explicit)
// ============================================================

/// Reads a required environment variable.
///
/// # Behavior
/// - Fails fast if the variable is missing
/// - Produces a clear, human-readable error message
/// - Intended for startup-time configuration validation
macro_rules! required_env {
    // ---
    ($key:expr) => {{
        let key: &str = &$key;
        std::env::var(key)
            .map_err(|_| anyhow::anyhow!("Missing required configuration: {key}"))?
    }};
}

/// Reads an optional environment variable and attempts to parse it.
///
/// If the variable is missing or cannot be parsed, the provided
/// default value is used. This macro is appropriate for non-critical
/// tuning parameters where fallback behavior is acceptable.
macro_rules! optional_env_parse {
    // ---
    ($key:expr, $ty:ty, $default:expr) => {{
        let key: &str = &$key;
        std::env::var(key)
            .ok()
            .and_then(|v| v.trim().parse::<$ty>().ok())
            .unwrap_or($default)
    }};
}

#[cfg(test)]
/// Asserts that a configuration constructor fails due to a missing
/// required environment variable.
macro_rules! assert_missing_config {
    // ---
    ($expr:expr, $key:literal) => {{
        let err = $expr.expect_err("expected configuration error");
        assert!(
            err.to_string()
                .contains(concat!("Missing required configuration: ", $key)),
            "unexpected error: {err}"
        );
    }};
}

/// Routes served by the gateway itself; proxy and status routes may not reuse them.
pub const RESERVED_ROUTES: [&str; 4] = ["/", "/health", "/metrics", "/api/service-status"];

// ============================================================
// Public configuration facade
// ============================================================

/// Aggregated gateway configuration.
///
/// This is the single source of truth for startup configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: server::ServerConfig,

    /// Dependencies in configuration order.
    pub dependencies: Vec<Dependency>,

    /// Proxy table; every entry names a configured dependency.
    pub proxy_routes: Vec<ProxyRoute>,

    /// Background probe interval. `None` keeps health purely request-driven.
    pub probe_interval: Option<Duration>,
}

impl AppConfig {
    /// Loads and validates all gateway configuration from the environment.
    ///
    /// # Errors
    /// Returns an error if any required configuration is missing or invalid.
    /// This function is intended to be called exactly once at startup.
    pub fn from_env() -> Result<Self> {
        // ---
        let server = server::ServerConfig::from_env();
        let dependencies = dependencies::from_env()?;
        let proxy_routes = routes::from_env(&dependencies)?;

        let probe_secs = optional_env_parse!("GATEWAY_PROBE_INTERVAL_SEC", u64, 0);
        let probe_interval = (probe_secs > 0).then(|| Duration::from_secs(probe_secs));

        let config = Self {
            server,
            dependencies,
            proxy_routes,
            probe_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field invariants the router relies on.
    ///
    /// # Errors
    /// Fails on duplicate dependency names, zero timeouts, proxy routes
    /// naming an unknown dependency, and any two routes sharing a path.
    pub fn validate(&self) -> Result<()> {
        // ---
        let mut names = HashSet::new();
        for dep in &self.dependencies {
            if !names.insert(dep.name.as_str()) {
                anyhow::bail!("Invalid configuration: dependency `{}` listed twice", dep.name);
            }
            if dep.timeout.is_zero() {
                anyhow::bail!(
                    "Invalid configuration for {}_TIMEOUT_MS: timeout must be greater than zero",
                    env_prefix(&dep.name)
                );
            }
        }

        let mut paths: HashSet<&str> = RESERVED_ROUTES.iter().copied().collect();
        for dep in &self.dependencies {
            if !dep.status_route.starts_with('/') || !paths.insert(dep.status_route.as_str()) {
                anyhow::bail!(
                    "Invalid configuration for {}_STATUS_ROUTE: `{}` is not a free absolute path",
                    env_prefix(&dep.name),
                    dep.status_route
                );
            }
        }

        for route in &self.proxy_routes {
            if !names.contains(route.dependency.as_str()) {
                anyhow::bail!(
                    "Invalid configuration for GATEWAY_PROXY_ROUTES: `{}` names unknown dependency `{}`",
                    route.template,
                    route.dependency
                );
            }
            if !paths.insert(route.template.as_str()) {
                anyhow::bail!(
                    "Invalid configuration for GATEWAY_PROXY_ROUTES: route `{}` is already taken",
                    route.template
                );
            }
        }

        Ok(())
    }

    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|dep| dep.name == name)
    }
}

/// Environment prefix for a dependency's keys.
pub fn env_prefix(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

// ============================================================
// Server configuration
// ============================================================

mod server {
    // ---

    /// Listening socket configuration.
    #[derive(Debug, Clone)]
    pub struct ServerConfig {
        /// Interface to bind. Defaults to `0.0.0.0`.
        pub bind_addr: String,

        /// Listening port. Read from `GATEWAY_PORT`, then `PORT`. Defaults to 3000.
        pub port: u16,
    }

    impl ServerConfig {
        /// Builds a [`ServerConfig`] from environment variables.
        pub fn from_env() -> Self {
            // ---
            let bind_addr =
                std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
            let fallback_port = optional_env_parse!("PORT", u16, 3000);
            let port = optional_env_parse!("GATEWAY_PORT", u16, fallback_port);

            Self { bind_addr, port }
        }

        /// `host:port` form accepted by `TcpListener::bind`.
        pub fn endpoint(&self) -> String {
            format!("{}:{}", self.bind_addr, self.port)
        }
    }
}
pub use server::ServerConfig;

// ============================================================
// Dependency configuration
// ============================================================

mod dependencies {
    // ---
    use super::*;

    pub const DEFAULT_DEPENDENCIES: &str = "catalogue,recommendation,voting";

    /// Default timeout for a single dependency call.
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

    /// Reads every dependency named in `GATEWAY_DEPENDENCIES`.
    ///
    /// # Errors
    /// Returns an error if any named dependency lacks a base address.
    pub fn from_env() -> Result<Vec<Dependency>> {
        // ---
        let names = std::env::var("GATEWAY_DEPENDENCIES")
            .unwrap_or_else(|_| DEFAULT_DEPENDENCIES.to_string());

        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(dependency_from_env)
            .collect()
    }

    /// Builds one [`Dependency`] from its prefixed environment variables.
    pub fn dependency_from_env(name: &str) -> Result<Dependency> {
        // ---
        let prefix = env_prefix(name);

        let base_uri = required_env!(format!("{prefix}_BASE_URI"));
        let timeout_ms = optional_env_parse!(format!("{prefix}_TIMEOUT_MS"), u64, DEFAULT_TIMEOUT_MS);
        let health_path = std::env::var(format!("{prefix}_HEALTH_PATH"))
            .unwrap_or_else(|_| default_health_path(name).to_string());
        let status_route = std::env::var(format!("{prefix}_STATUS_ROUTE"))
            .unwrap_or_else(|_| default_status_route(name));
        let non_2xx_reachable = optional_env_parse!(format!("{prefix}_NON_2XX_REACHABLE"), bool, true);
        let retries = optional_env_parse!(format!("{prefix}_RETRIES"), u32, 0);

        Ok(Dependency {
            name: name.to_string(),
            base_uri: base_uri.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(timeout_ms),
            health_path,
            status_route,
            non_2xx_reachable,
            retries,
        })
    }

    /// Path probed for liveness when none is configured.
    ///
    /// The known services have no dedicated health endpoint, so these reuse
    /// a cheap business endpoint.
    pub fn default_health_path(name: &str) -> &'static str {
        match name {
            "catalogue" => "/api/products",
            "recommendation" => "/api/recommendation-status",
            "voting" => "/api/origamis",
            _ => "/health",
        }
    }

    /// Gateway route reporting a dependency's status when none is configured.
    pub fn default_status_route(name: &str) -> String {
        match name {
            "voting" => "/votingservice-status".to_string(),
            _ => format!("/{name}-status"),
        }
    }
}
pub use dependencies::{default_health_path, default_status_route, dependency_from_env};

// ============================================================
// Proxy route configuration
// ============================================================

mod routes {
    // ---
    use super::*;

    /// Reads `GATEWAY_PROXY_ROUTES`, or falls back to the default table
    /// restricted to configured dependencies.
    ///
    /// # Errors
    /// Returns an error if an explicit entry cannot be parsed.
    pub fn from_env(dependencies: &[Dependency]) -> Result<Vec<ProxyRoute>> {
        // ---
        match std::env::var("GATEWAY_PROXY_ROUTES") {
            Ok(raw) => raw
                .split(',')
                .filter(|entry| !entry.trim().is_empty())
                .map(|entry| {
                    ProxyRoute::parse(entry).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Invalid configuration for GATEWAY_PROXY_ROUTES: `{}`",
                            entry.trim()
                        )
                    })
                })
                .collect(),
            Err(_) => Ok(ProxyRoute::defaults()
                .into_iter()
                .filter(|route| dependencies.iter().any(|dep| dep.name == route.dependency))
                .collect()),
        }
    }
}

// ============================================================
// Tests
// ============================================================
