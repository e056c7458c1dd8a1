//! Blackbox probe engine.
//!
//! Given a target and a named module, performs one live network interaction
//! and reports its outcome as a flat, ordered list of numeric metrics:
//! - HTTP/HTTPS requests judged by status code, body content and TLS state
//! - TCP expect/send scripts (banner checks, line-oriented handshakes)
//! - ICMPv4 echo (requires raw socket privileges)
//!
//! Every invocation is a single, independent measurement: no retries, no
//! caching, no history.
//!
//! # Example
//!
//! ```no_run
//! use probe::{Config, Module, NoopObserver, ProberKind, execute};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::default();
//! config.modules.insert(
//!     "http2xx".to_string(),
//!     Module::new(ProberKind::Http, Duration::from_secs(5)),
//! );
//!
//! let result = execute("prometheus.io", "http2xx", &config, &NoopObserver).await?;
//! print!("{}", result.metrics.render());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod metric;
pub mod probers;

pub use config::{
    Config, DEFAULT_MODULE, HttpProbeConfig, IcmpProbeConfig, Module, ProberKind,
    QueryResponseStep, TcpProbeConfig,
};
pub use executor::{
    NoopObserver, ProbeError, ProbeObserver, ProbeRequest, ProbeResult, execute, execute_request,
};
pub use metric::{Metric, MetricSink};
pub use probers::{HttpProber, IcmpProber, Prober, TcpProber};
