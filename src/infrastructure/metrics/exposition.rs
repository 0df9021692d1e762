//! Text exposition of a registry snapshot.

use super::registry::RegistrySnapshot;
use crate::domain::MetricError;
use prometheus::{Encoder, TextEncoder};

/// Content type served by the `/metrics` endpoint.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

impl RegistrySnapshot {
    /// Renders the gathered families in the Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricError> {
        // ---
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(self.families(), &mut buffer)
            .map_err(|err| MetricError::Encoding(err.to_string()))?;
        String::from_utf8(buffer).map_err(|err| MetricError::Encoding(err.to_string()))
    }
}
