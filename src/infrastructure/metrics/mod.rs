mod counters;
mod exposition;
mod registry;

pub use counters::{
    DEPENDENCY_CALLS_TOTAL, DEPENDENCY_UP, HTTP_DURATION_BUCKETS, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION, PROCESS_NAMESPACE,
};
pub use exposition::CONTENT_TYPE;
pub use registry::{HistogramValue, MetricRegistry, RegistrySnapshot, SeriesValue};

// Recording helpers for sibling modules
pub(crate) use counters::{increment_dependency_call, set_dependency_up, track_http_request};

use std::sync::Arc;

/// Shared handle to the gateway's registry.
pub type MetricsPtr = Arc<MetricRegistry>;

/// Creates a registry with every gateway metric family declared, plus
/// process metrics where the platform provides them.
///
/// Registration errors are programming errors and abort startup.
pub fn create() -> anyhow::Result<MetricsPtr> {
    // ---
    tracing::info!("Initializing metric registry");
    let registry = MetricRegistry::new();
    counters::register_gateway_metrics(&registry)?;
    counters::register_process_metrics(&registry)?;

    Ok(Arc::new(registry))
}
