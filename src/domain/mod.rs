mod dependency;
mod metrics;
mod outcome;
mod route;

// Publicly expose the metric model
pub use metrics::{Labels, MetricDefinition, MetricError, MetricKind, SeriesKey};

// Publicly expose the dependency model
pub use dependency::{Dependency, DependencyStatus, HealthSnapshot, HealthState};

// Publicly expose the outbound call abstraction
pub use outcome::{
    DependencyClient, DependencyClientPtr, DependencyRequest, DependencyResponse, Failure,
    FailureReason, Outcome,
};

// Publicly expose the proxy route table entry
pub use route::ProxyRoute;
