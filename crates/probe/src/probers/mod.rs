//! Protocol prober implementations.

pub mod http;
pub mod icmp;
pub mod tcp;

use crate::config::Module;
use crate::metric::MetricSink;
use async_trait::async_trait;

pub use http::HttpProber;
pub use icmp::IcmpProber;
pub use tcp::TcpProber;

/// A single protocol-specific measurement attempt.
///
/// Implementations bound every blocking operation by `module.timeout`
/// themselves; nothing cancels them from the outside. Failures are reported
/// through the returned flag only, with whatever metrics were gathered so far
/// left in `sink`.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `target` and report whether it passed every check.
    async fn probe(&self, target: &str, module: &Module, sink: &mut MetricSink) -> bool;
}
