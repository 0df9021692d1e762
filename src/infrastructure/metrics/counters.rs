use super::registry::MetricRegistry;
use crate::domain::{Labels, MetricDefinition, MetricError};
use std::time::Duration;

pub const HTTP_REQUEST_DURATION: &str = "gateway_http_request_duration_seconds";
pub const HTTP_REQUESTS_TOTAL: &str = "gateway_http_requests_total";
pub const DEPENDENCY_UP: &str = "gateway_service_dependency_up";
pub const DEPENDENCY_CALLS_TOTAL: &str = "gateway_dependency_calls_total";

/// Prefix of the process families (`gateway_process_cpu_seconds_total`, ...).
pub const PROCESS_NAMESPACE: &str = "gateway";

/// Request duration buckets, in seconds.
pub const HTTP_DURATION_BUCKETS: [f64; 9] = [0.1, 0.3, 0.5, 0.7, 1.0, 3.0, 5.0, 7.0, 10.0];

/// Declares every metric family the gateway records into.
pub fn register_gateway_metrics(registry: &MetricRegistry) -> Result<(), MetricError> {
    // ---
    registry.register(MetricDefinition::histogram(
        HTTP_REQUEST_DURATION,
        "Duration of HTTP requests in seconds",
        &HTTP_DURATION_BUCKETS,
    )
    .with_labels(["method", "route", "status_code"]))?;
    registry.register(MetricDefinition::counter(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests",
    )
    .with_labels(["method", "route", "status_code"]))?;
    registry.register(MetricDefinition::gauge(
        DEPENDENCY_UP,
        "Status of service dependencies (1 = up, 0 = down)",
    )
    .with_labels(["service"]))?;
    registry.register(MetricDefinition::counter(
        DEPENDENCY_CALLS_TOTAL,
        "Outbound dependency calls by outcome",
    )
    .with_labels(["service", "outcome"]))?;
    Ok(())
}

/// Exports CPU, memory and file-descriptor usage of the gateway process.
#[cfg(target_os = "linux")]
pub fn register_process_metrics(registry: &MetricRegistry) -> Result<(), MetricError> {
    // ---
    use prometheus::process_collector::ProcessCollector;

    let pid = std::process::id() as i32;
    registry.register_collector(Box::new(ProcessCollector::new(pid, PROCESS_NAMESPACE)))
}

#[cfg(not(target_os = "linux"))]
pub fn register_process_metrics(_registry: &MetricRegistry) -> Result<(), MetricError> {
    tracing::debug!("Process metrics are not available on this platform");
    Ok(())
}

/// Records one finished inbound request.
pub fn track_http_request(
    registry: &MetricRegistry,
    method: &str,
    route: &str,
    status: u16,
    elapsed: Duration,
) -> Result<(), MetricError> {
    // ---
    let labels = Labels::new([
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status_code", status.to_string()),
    ]);
    registry.observe(HTTP_REQUEST_DURATION, &labels, elapsed.as_secs_f64())?;
    registry.increment(HTTP_REQUESTS_TOTAL, &labels, 1)
}

/// Sets the up/down gauge of a dependency.
pub fn set_dependency_up(registry: &MetricRegistry, service: &str, value: f64) -> Result<(), MetricError> {
    registry.set(DEPENDENCY_UP, &Labels::new([("service", service)]), value)
}

/// Counts one outbound call by outcome label.
pub fn increment_dependency_call(
    registry: &MetricRegistry,
    service: &str,
    outcome: &str,
) -> Result<(), MetricError> {
    registry.increment(
        DEPENDENCY_CALLS_TOTAL,
        &Labels::new([("service", service), ("outcome", outcome)]),
        1,
    )
}
