// Gateway module - controls public API for handlers
// Modules are private, only exported symbols are public

mod fallback;
mod health;
mod metrics;
mod proxy;
mod root;
mod shared_types;
mod status;

// Core handlers
pub use fallback::{fallback_handler, NOT_FOUND_BODY};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use root::root_handler;

// Dependency-facing handlers
pub use proxy::proxy_handler;
pub use status::{dependency_status, service_status};

// Error and response types
pub use shared_types::{ErrorBody, GatewayError, ProxyErrorBody};
