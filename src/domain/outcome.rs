use super::dependency::Dependency;
use axum::body::Bytes;
use axum::http::Method;
use std::fmt;
use std::sync::Arc;

/// An outbound request addressed relative to a dependency's base address.
#[derive(Debug, Clone)]
pub struct DependencyRequest {
    pub method: Method,
    /// Path plus optional query string, e.g. `/api/products?page=2`.
    pub path_and_query: String,
}

impl DependencyRequest {
    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path_and_query: path_and_query.into(),
        }
    }
}

/// A complete reply received from a dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl DependencyResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why an outbound call did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// No reply within the dependency's timeout.
    Timeout,
    /// Nothing accepted the connection.
    ConnectionRefused(String),
    /// The dependency answered, but not with a 2xx status.
    NonSuccessStatus(DependencyResponse),
    /// Any other transport-level problem.
    Transport(String),
}

/// Outcome classification used for logging and the `outcome` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    ConnectionRefused,
    NonSuccessStatus,
    TransportError,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::ConnectionRefused => "connection_refused",
            FailureReason::NonSuccessStatus => "non_2xx_status",
            FailureReason::TransportError => "transport_error",
        }
    }
}

impl Failure {
    pub fn reason(&self) -> FailureReason {
        match self {
            Failure::Timeout => FailureReason::Timeout,
            Failure::ConnectionRefused(_) => FailureReason::ConnectionRefused,
            Failure::NonSuccessStatus(_) => FailureReason::NonSuccessStatus,
            Failure::Transport(_) => FailureReason::TransportError,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Timeout => write!(f, "request timed out"),
            Failure::ConnectionRefused(detail) => write!(f, "connection refused: {detail}"),
            Failure::NonSuccessStatus(resp) => write!(f, "unexpected status {}", resp.status),
            Failure::Transport(detail) => write!(f, "transport error: {detail}"),
        }
    }
}

/// Result of one call to a dependency.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(DependencyResponse),
    Failure(Failure),
}

impl Outcome {
    /// Whether this outcome proves the dependency is reachable.
    ///
    /// A non-2xx reply counts only when `non_2xx_reachable` is set.
    pub fn is_reachable(&self, non_2xx_reachable: bool) -> bool {
        // ---
        match self {
            Outcome::Success(_) => true,
            Outcome::Failure(Failure::NonSuccessStatus(_)) => non_2xx_reachable,
            Outcome::Failure(_) => false,
        }
    }

    /// Value of the `outcome` label on `gateway_dependency_calls_total`.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Failure(failure) => failure.reason().as_str(),
        }
    }
}

/// Abstraction over "call a dependency, get an outcome".
///
/// Implementations classify every error into an [`Outcome`] and never
/// retry; timeouts and health reporting are layered on by the probe client.
#[async_trait::async_trait]
pub trait DependencyClient: Send + Sync {
    // ---
    async fn call(&self, dependency: &Dependency, request: &DependencyRequest) -> Outcome;
}

/// Type alias for any backend that implements DependencyClient.
pub type DependencyClientPtr = Arc<dyn DependencyClient>;
