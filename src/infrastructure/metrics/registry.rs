//! In-process metric registry.
//!
//! The registry is an explicitly constructed value, not a global: the gateway
//! builds one at startup and hands it to every component through `AppState`,
//! and tests build their own.
//!
//! Series live in per-registry Prometheus vectors (`IntCounterVec`,
//! `GaugeVec`, `HistogramVec`), whose updates are atomic per series. On top of
//! them the registry keeps a definition table that enforces the family kind,
//! bucket layout and label keys, and an index of the series created so far so
//! that reads never create a series as a side effect.

use crate::domain::{Labels, MetricDefinition, MetricError, MetricKind, SeriesKey};
use dashmap::DashSet;
use parking_lot::RwLock;
use prometheus::core::{Collector, MetricVec, MetricVecBuilder};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::collections::{BTreeMap, HashMap};

/// Value of one series as read back from the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    Counter(u64),
    Gauge(f64),
    Histogram(HistogramValue),
}

/// Observation count and running sum of a histogram series.
///
/// Per-bucket counts are only exposed through the text exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramValue {
    pub count: u64,
    pub sum: f64,
}

#[derive(Clone)]
enum Family {
    Counter(IntCounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

impl Family {
    fn build(definition: &MetricDefinition) -> Result<Self, prometheus::Error> {
        // ---
        let labels: Vec<&str> = definition.label_names.iter().map(String::as_str).collect();
        let family = match &definition.kind {
            MetricKind::Counter => Family::Counter(IntCounterVec::new(
                Opts::new(definition.name.as_str(), definition.help.as_str()),
                &labels,
            )?),
            MetricKind::Gauge => Family::Gauge(GaugeVec::new(
                Opts::new(definition.name.as_str(), definition.help.as_str()),
                &labels,
            )?),
            MetricKind::Histogram { buckets } => Family::Histogram(HistogramVec::new(
                HistogramOpts::new(definition.name.as_str(), definition.help.as_str())
                    .buckets(buckets.clone()),
                &labels,
            )?),
        };
        Ok(family)
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Family::Counter(vec) => Box::new(vec.clone()),
            Family::Gauge(vec) => Box::new(vec.clone()),
            Family::Histogram(vec) => Box::new(vec.clone()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Family::Counter(_) => "counter",
            Family::Gauge(_) => "gauge",
            Family::Histogram(_) => "histogram",
        }
    }
}

struct Registered {
    definition: MetricDefinition,
    family: Family,
}

/// Registry of metric families and their series.
pub struct MetricRegistry {
    registry: Registry,
    families: RwLock<HashMap<String, Registered>>,
    series: DashSet<SeriesKey>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    // ---
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: RwLock::new(HashMap::new()),
            series: DashSet::new(),
        }
    }

    /// Declares a metric family.
    ///
    /// Re-declaring a name with the same kind, bucket boundaries and label
    /// keys is a no-op. Any other redeclaration fails with
    /// [`MetricError::DuplicateDefinition`].
    pub fn register(&self, definition: MetricDefinition) -> Result<(), MetricError> {
        // ---
        definition.validate()?;

        let mut families = self.families.write();
        if let Some(existing) = families.get(&definition.name) {
            let existing = &existing.definition;
            if existing.kind == definition.kind && existing.label_names == definition.label_names {
                return Ok(());
            }
            return Err(MetricError::DuplicateDefinition {
                name: definition.name.clone(),
                existing: describe(existing),
                requested: describe(&definition),
            });
        }

        let family = Family::build(&definition).map_err(|err| rejected(&definition.name, err))?;
        self.registry
            .register(family.collector())
            .map_err(|err| rejected(&definition.name, err))?;

        tracing::debug!(metric = %definition.name, kind = %definition.kind, "Registered metric");
        families.insert(definition.name.clone(), Registered { definition, family });
        Ok(())
    }

    /// Adds a collector that exports its own families, such as process metrics.
    pub fn register_collector(&self, collector: Box<dyn Collector>) -> Result<(), MetricError> {
        // ---
        let name = collector
            .desc()
            .first()
            .map(|desc| desc.fq_name.clone())
            .unwrap_or_default();
        self.registry
            .register(collector)
            .map_err(|err| rejected(&name, err))
    }

    /// Adds `delta` to a counter series.
    pub fn increment(&self, name: &str, labels: &Labels, delta: u64) -> Result<(), MetricError> {
        // ---
        match self.family(name)? {
            Family::Counter(vec) => resolve(name, &vec, labels)?.inc_by(delta),
            other => return Err(wrong_kind(name, "counter", &other)),
        }
        self.track(name, labels);
        Ok(())
    }

    /// Records one observation into a histogram series.
    pub fn observe(&self, name: &str, labels: &Labels, value: f64) -> Result<(), MetricError> {
        // ---
        match self.family(name)? {
            Family::Histogram(vec) => resolve(name, &vec, labels)?.observe(value),
            other => return Err(wrong_kind(name, "histogram", &other)),
        }
        self.track(name, labels);
        Ok(())
    }

    /// Replaces the value of a gauge series.
    pub fn set(&self, name: &str, labels: &Labels, value: f64) -> Result<(), MetricError> {
        // ---
        match self.family(name)? {
            Family::Gauge(vec) => resolve(name, &vec, labels)?.set(value),
            other => return Err(wrong_kind(name, "gauge", &other)),
        }
        self.track(name, labels);
        Ok(())
    }

    /// Definition of a registered family.
    pub fn definition(&self, name: &str) -> Option<MetricDefinition> {
        self.families
            .read()
            .get(name)
            .map(|registered| registered.definition.clone())
    }

    /// Copies every family and series into a point-in-time snapshot.
    ///
    /// The exposition half is gathered from the collectors, which copy each
    /// series atomically. Series are individually consistent but not
    /// consistent with one another.
    pub fn snapshot(&self) -> RegistrySnapshot {
        // ---
        let families = self.registry.gather();

        let keys: Vec<SeriesKey> = self.series.iter().map(|entry| entry.key().clone()).collect();
        let series = keys
            .into_iter()
            .filter_map(|key| {
                let value = self.read(&key)?;
                Some((key, value))
            })
            .collect();

        RegistrySnapshot { families, series }
    }

    fn family(&self, name: &str) -> Result<Family, MetricError> {
        self.families
            .read()
            .get(name)
            .map(|registered| registered.family.clone())
            .ok_or_else(|| MetricError::UnknownMetric(name.to_string()))
    }

    fn track(&self, name: &str, labels: &Labels) {
        // ---
        let key = SeriesKey::new(name, labels);
        if !self.series.contains(&key) {
            self.series.insert(key);
        }
    }

    fn read(&self, key: &SeriesKey) -> Option<SeriesValue> {
        // ---
        let value = match self.family(&key.name).ok()? {
            Family::Counter(vec) => SeriesValue::Counter(resolve(&key.name, &vec, &key.labels).ok()?.get()),
            Family::Gauge(vec) => SeriesValue::Gauge(resolve(&key.name, &vec, &key.labels).ok()?.get()),
            Family::Histogram(vec) => {
                let histogram = resolve(&key.name, &vec, &key.labels).ok()?;
                SeriesValue::Histogram(HistogramValue {
                    count: histogram.get_sample_count(),
                    sum: histogram.get_sample_sum(),
                })
            }
        };
        Some(value)
    }
}

/// Looks up the series of `vec` for a label set, creating it on first use.
fn resolve<T: MetricVecBuilder>(
    name: &str,
    vec: &MetricVec<T>,
    labels: &Labels,
) -> Result<T::M, MetricError> {
    // ---
    let values: HashMap<&str, &str> = labels.iter().collect();
    vec.get_metric_with(&values)
        .map_err(|err| MetricError::InvalidLabels {
            name: name.to_string(),
            reason: err.to_string(),
        })
}

fn wrong_kind(name: &str, expected: &'static str, actual: &Family) -> MetricError {
    MetricError::WrongKind {
        name: name.to_string(),
        expected,
        actual: actual.kind(),
    }
}

fn rejected(name: &str, err: prometheus::Error) -> MetricError {
    MetricError::Rejected {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

fn describe(definition: &MetricDefinition) -> String {
    match &definition.kind {
        MetricKind::Histogram { buckets } => {
            format!("histogram{buckets:?} labelled {:?}", definition.label_names)
        }
        other => format!("{other} labelled {:?}", definition.label_names),
    }
}

/// Point-in-time copy of the registry.
///
/// Holds the gathered metric families for the text exposition, plus the
/// values of every series the gateway has written, keyed by name and labels.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    families: Vec<MetricFamily>,
    series: BTreeMap<SeriesKey, SeriesValue>,
}

impl RegistrySnapshot {
    /// Gathered families, ready for an encoder.
    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    /// Looks up a single series.
    pub fn find(&self, name: &str, labels: &Labels) -> Option<&SeriesValue> {
        self.series.get(&SeriesKey::new(name, labels))
    }

    /// Number of series recorded under a family.
    pub fn series_count(&self, name: &str) -> usize {
        self.series.keys().filter(|key| key.name == name).count()
    }

    pub fn counter(&self, name: &str, labels: &Labels) -> Option<u64> {
        match self.find(name, labels)? {
            SeriesValue::Counter(value) => Some(*value),
            _ => None,
        }
    }

    pub fn gauge(&self, name: &str, labels: &Labels) -> Option<f64> {
        match self.find(name, labels)? {
            SeriesValue::Gauge(value) => Some(*value),
            _ => None,
        }
    }

    pub fn histogram(&self, name: &str, labels: &Labels) -> Option<&HistogramValue> {
        match self.find(name, labels)? {
            SeriesValue::Histogram(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn registry_with_defaults() -> MetricRegistry {
        // ---
        let registry = MetricRegistry::new();
        registry
            .register(MetricDefinition::counter("requests_total", "Requests").with_labels(["route"]))
            .unwrap();
        registry
            .register(MetricDefinition::gauge("dependency_up", "Up").with_labels(["service"]))
            .unwrap();
        registry
            .register(
                MetricDefinition::histogram("latency_seconds", "Latency", &[0.1, 0.5, 1.0])
                    .with_labels(["route"]),
            )
            .unwrap();
        registry
    }

    #[test]
    fn register_is_idempotent_for_identical_kind() {
        // ---
        let registry = registry_with_defaults();

        assert!(registry
            .register(MetricDefinition::counter("requests_total", "Different help").with_labels(["route"]))
            .is_ok());
        assert!(registry
            .register(
                MetricDefinition::histogram("latency_seconds", "Latency", &[0.1, 0.5, 1.0])
                    .with_labels(["route"])
            )
            .is_ok());
    }

    #[test]
    fn register_rejects_conflicting_redeclaration() {
        // ---
        let registry = registry_with_defaults();

        let err = registry
            .register(MetricDefinition::gauge("requests_total", "Requests").with_labels(["route"]))
            .unwrap_err();
        assert!(matches!(err, MetricError::DuplicateDefinition { .. }));

        let err = registry
            .register(
                MetricDefinition::histogram("latency_seconds", "Latency", &[1.0, 2.0])
                    .with_labels(["route"]),
            )
            .unwrap_err();
        assert!(matches!(err, MetricError::DuplicateDefinition { .. }));

        let err = registry
            .register(MetricDefinition::counter("requests_total", "Requests").with_labels(["path"]))
            .unwrap_err();
        assert!(matches!(err, MetricError::DuplicateDefinition { .. }));
    }

    #[test]
    fn recording_unknown_or_wrong_kind_fails() {
        // ---
        let registry = registry_with_defaults();
        let labels = Labels::new([("route", "/")]);

        assert_eq!(
            registry.increment("missing_total", &labels, 1),
            Err(MetricError::UnknownMetric("missing_total".to_string()))
        );
        assert!(matches!(
            registry.observe("requests_total", &labels, 1.0),
            Err(MetricError::WrongKind { expected: "histogram", actual: "counter", .. })
        ));
        assert!(matches!(
            registry.increment("dependency_up", &labels, 1),
            Err(MetricError::WrongKind { .. })
        ));
        assert!(matches!(
            registry.set("latency_seconds", &labels, 1.0),
            Err(MetricError::WrongKind { .. })
        ));
    }

    #[test]
    fn undeclared_label_keys_are_rejected() {
        // ---
        let registry = registry_with_defaults();

        let err = registry
            .increment("requests_total", &Labels::new([("path", "/x")]), 1)
            .unwrap_err();
        assert!(matches!(err, MetricError::InvalidLabels { .. }));
        assert_eq!(registry.snapshot().series_count("requests_total"), 0);
    }

    #[test]
    fn same_labels_in_any_order_update_one_series() {
        // ---
        let registry = MetricRegistry::new();
        registry
            .register(MetricDefinition::counter("pairs_total", "Pairs").with_labels(["a", "b"]))
            .unwrap();

        registry
            .increment("pairs_total", &Labels::new([("a", "1"), ("b", "2")]), 1)
            .unwrap();
        registry
            .increment("pairs_total", &Labels::new([("b", "2"), ("a", "1")]), 2)
            .unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.series_count("pairs_total"), 1);
        assert_eq!(
            snapshot.counter("pairs_total", &Labels::new([("a", "1"), ("b", "2")])),
            Some(3)
        );
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        // ---
        let registry = registry_with_defaults();
        let labels = Labels::new([("route", "/")]);

        registry.observe("latency_seconds", &labels, 0.05).unwrap();
        registry.observe("latency_seconds", &labels, 0.5).unwrap();
        registry.observe("latency_seconds", &labels, 7.0).unwrap();

        let snapshot = registry.snapshot();
        let histogram = snapshot.histogram("latency_seconds", &labels).unwrap();
        assert_eq!(histogram.count, 3);
        assert!((histogram.sum - 7.55).abs() < 1e-9);
    }

    #[test]
    fn gauge_set_replaces_value() {
        // ---
        let registry = registry_with_defaults();
        let labels = Labels::new([("service", "catalogue")]);

        registry.set("dependency_up", &labels, 1.0).unwrap();
        registry.set("dependency_up", &labels, 0.0).unwrap();

        assert_eq!(registry.snapshot().gauge("dependency_up", &labels), Some(0.0));
    }

    #[test]
    fn reads_never_create_series() {
        // ---
        let registry = registry_with_defaults();
        let labels = Labels::new([("route", "/never")]);

        assert_eq!(registry.snapshot().counter("requests_total", &labels), None);
        assert_eq!(registry.snapshot().series_count("requests_total"), 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        // ---
        let registry = Arc::new(registry_with_defaults());
        let labels = Labels::new([("route", "/api/products")]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let labels = labels.clone();
                thread::spawn(move || {
                    for i in 0..1_000 {
                        registry.increment("requests_total", &labels, 1).unwrap();
                        registry
                            .observe("latency_seconds", &labels, (i % 3) as f64 * 0.4)
                            .unwrap();
                        if i % 250 == 0 {
                            let _ = registry.snapshot();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counter("requests_total", &labels), Some(8_000));
        assert_eq!(
            snapshot.histogram("latency_seconds", &labels).map(|h| h.count),
            Some(8_000)
        );
    }
}
