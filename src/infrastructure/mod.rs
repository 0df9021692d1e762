mod http_client;
pub mod metrics;

// Re-export the factory functions for easy access
pub use http_client::{create as create_http_client, HttpDependencyClient};
pub use metrics::create as create_metrics;
