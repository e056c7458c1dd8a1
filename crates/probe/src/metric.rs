//! Ordered metric collection for a single probe invocation.

use std::fmt;

/// A single named measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: f64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.6}", self.name, self.value)
    }
}

/// Append-only sequence of metrics emitted by one probe.
///
/// The same name may appear more than once; readers see emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSink {
    metrics: Vec<Metric>,
}

impl MetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a measurement.
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push(Metric::new(name, value));
    }

    /// First value recorded under `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Metric names in emission order.
    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Render as `"<name> <value>\n"` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for metric in &self.metrics {
            out.push_str(&metric.to_string());
            out.push('\n');
        }
        out
    }
}
