//! Metric definitions, label sets and the errors raised by registry misuse.
//!
//! These types carry no storage of their own. The registry in
//! `infrastructure::metrics` checks every write against the
//! [`MetricDefinition`] table before it reaches the underlying Prometheus
//! collectors, and indexes the series it has created by [`SeriesKey`], which
//! is immutable once built, so a `(name, labels)` pair always resolves to the
//! same series.

use std::fmt;
use thiserror::Error;

/// The kind of a metric family, fixed at registration time.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    /// Monotonically increasing integer.
    Counter,
    /// Arbitrarily settable value.
    Gauge,
    /// Distribution over fixed, strictly ascending upper bounds.
    Histogram { buckets: Vec<f64> },
}

impl MetricKind {
    /// Exposition name of the kind (`# TYPE` line).
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram { .. } => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    /// Label keys every series of this family carries, in declaration order.
    pub label_names: Vec<String>,
}

impl MetricDefinition {
    // ---
    pub fn counter(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind: MetricKind::Counter,
            label_names: Vec::new(),
        }
    }

    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind: MetricKind::Gauge,
            label_names: Vec::new(),
        }
    }

    pub fn histogram(name: impl Into<String>, help: impl Into<String>, buckets: &[f64]) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind: MetricKind::Histogram {
                buckets: buckets.to_vec(),
            },
            label_names: Vec::new(),
        }
    }

    /// Declares the label keys of the family.
    pub fn with_labels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the definition is usable before it is accepted by a registry.
    ///
    /// Histogram boundaries must be non-empty, finite and strictly ascending.
    pub fn validate(&self) -> Result<(), MetricError> {
        // ---
        if let MetricKind::Histogram { buckets } = &self.kind {
            if buckets.is_empty() {
                return Err(MetricError::InvalidBuckets {
                    name: self.name.clone(),
                    reason: "at least one bucket boundary is required",
                });
            }
            if buckets.iter().any(|b| !b.is_finite()) {
                return Err(MetricError::InvalidBuckets {
                    name: self.name.clone(),
                    reason: "bucket boundaries must be finite",
                });
            }
            if buckets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(MetricError::InvalidBuckets {
                    name: self.name.clone(),
                    reason: "bucket boundaries must be strictly ascending",
                });
            }
        }
        Ok(())
    }
}

/// Label set of a single series.
///
/// Pairs are kept sorted by key so that two label sets built in a different
/// order compare, hash and render identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    /// Builds a label set from key/value pairs. A repeated key keeps its last value.
    pub fn new<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        // ---
        let mut pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        // Stable sort keeps insertion order among equal keys, so dedup from the back.
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.reverse();
        pairs.dedup_by(|a, b| a.0 == b.0);
        pairs.reverse();

        Labels(pairs)
    }

    pub fn empty() -> Self {
        Labels(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Identity of one time series: metric name plus its sorted label set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Labels,
}

impl SeriesKey {
    pub fn new(name: &str, labels: &Labels) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.clone(),
        }
    }
}

/// Errors raised by metric registration and recording.
///
/// All of these indicate a programming error rather than a runtime condition,
/// and are expected to surface at startup.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("metric `{name}` already registered as {existing}, cannot redeclare as {requested}")]
    DuplicateDefinition {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("metric `{0}` is not registered")]
    UnknownMetric(String),

    #[error("metric `{name}` is a {actual}, not a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("metric `{name}` has invalid buckets: {reason}")]
    InvalidBuckets { name: String, reason: &'static str },

    #[error("metric `{name}` rejected label set: {reason}")]
    InvalidLabels { name: String, reason: String },

    #[error("metric `{name}` rejected by the collector registry: {reason}")]
    Rejected { name: String, reason: String },

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}
