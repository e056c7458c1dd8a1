//! Blackbox exporter server.
//!
//! Serves `/probe` (one probe per request, result in Prometheus text
//! format), `/metrics` (latency and count aggregates across probes) and a
//! small landing page.

pub mod cli;
pub mod config;
pub mod http_server;
pub mod metrics;

pub use cli::{Args, LogFormat};
pub use config::{ConfigError, load_from_file};
pub use http_server::{AppState, ExporterServer, ProbeParams, router};
pub use metrics::{MetricsRegistry, ProbeLabels};
