//! Prometheus metrics aggregated across probes.

use probe::ProbeObserver;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// Labels attached to every aggregate probe metric
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    /// Module name as requested
    pub module: String,
    /// "true" or "false"
    pub success: String,
}

impl ProbeLabels {
    pub fn new(module: &str, success: bool) -> Self {
        Self {
            module: module.to_string(),
            success: success.to_string(),
        }
    }
}

/// Metrics registry with all exporter metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Running total of probe latency; with `probe_count` it gives the mean.
    latency_millis: Family<ProbeLabels, Counter<f64, AtomicU64>>,

    latency_histogram_millis: Family<ProbeLabels, Histogram>,

    probe_count: Family<ProbeLabels, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let latency_millis = Family::<ProbeLabels, Counter<f64, AtomicU64>>::default();
        registry.register(
            "probe_latency_millis",
            "Total latency of probes in milliseconds",
            latency_millis.clone(),
        );

        // 1ms .. ~524s
        let latency_histogram_millis = Family::<ProbeLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(1.0, 2.0, 20))
        });
        registry.register(
            "probe_latency_histogram_millis",
            "A histogram of latencies for probes",
            latency_histogram_millis.clone(),
        );

        let probe_count = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "probe_count",
            "Number of probes run",
            probe_count.clone(),
        );

        Self {
            registry,
            latency_millis,
            latency_histogram_millis,
            probe_count,
        }
    }

    /// Record one finished probe
    pub fn record_probe(&self, module: &str, success: bool, duration: Duration) {
        let labels = ProbeLabels::new(module, success);
        let millis = duration.as_secs_f64() * 1000.0;

        self.latency_millis.get_or_create(&labels).inc_by(millis);
        self.latency_histogram_millis
            .get_or_create(&labels)
            .observe(millis);
        self.probe_count.get_or_create(&labels).inc();
    }

    /// Render the registry in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeObserver for MetricsRegistry {
    fn observe(&self, module: &str, success: bool, duration: Duration) {
        self.record_probe(module, success, duration);
    }
}
