//! Probe orchestration.
//!
//! Resolves a (target, module) pair to a prober, runs it once, times it and
//! appends the uniform `probe_duration_seconds` / `probe_success` metrics.

use crate::config::{Config, DEFAULT_MODULE, Module, ProberKind};
use crate::metric::MetricSink;
use crate::probers::{HttpProber, IcmpProber, Prober, TcpProber};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Request-level errors. These are the requester's fault and are reported
/// before any network I/O; they are never counted as probe attempts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Target parameter is missing")]
    MissingTarget,

    #[error("Unknown module {0}")]
    UnknownModule(String),

    #[error("Unknown prober {0}")]
    UnknownProber(String),
}

/// Parameters of one probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub target: String,
    pub module: String,
}

impl ProbeRequest {
    /// Validate raw request parameters. A missing or empty module falls back
    /// to [`DEFAULT_MODULE`].
    pub fn new(target: Option<String>, module: Option<String>) -> Result<Self, ProbeError> {
        let target = target
            .filter(|t| !t.is_empty())
            .ok_or(ProbeError::MissingTarget)?;
        let module = module
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODULE.to_string());
        Ok(Self { target, module })
    }
}

/// Outcome of one probe invocation.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Prober metrics followed by `probe_duration_seconds` and `probe_success`.
    pub metrics: MetricSink,
    pub success: bool,
    pub duration: Duration,
}

/// Receives one observation per executed probe.
#[cfg_attr(test, mockall::automock)]
pub trait ProbeObserver: Send + Sync {
    fn observe(&self, module: &str, success: bool, duration: Duration);
}

/// Observer that discards everything.
pub struct NoopObserver;

impl ProbeObserver for NoopObserver {
    fn observe(&self, _module: &str, _success: bool, _duration: Duration) {}
}

/// Run the probe described by `request`.
pub async fn execute_request(
    request: &ProbeRequest,
    config: &Config,
    observer: &dyn ProbeObserver,
) -> Result<ProbeResult, ProbeError> {
    execute(&request.target, &request.module, config, observer).await
}

/// Probe `target` with the module named `module_name`.
///
/// The module timeout is handed to the prober, which bounds its own I/O;
/// the call is never cancelled from here.
pub async fn execute(
    target: &str,
    module_name: &str,
    config: &Config,
    observer: &dyn ProbeObserver,
) -> Result<ProbeResult, ProbeError> {
    if target.is_empty() {
        return Err(ProbeError::MissingTarget);
    }
    let module = config
        .module(module_name)
        .ok_or_else(|| ProbeError::UnknownModule(module_name.to_string()))?;
    let kind: ProberKind = module.prober.parse().map_err(ProbeError::UnknownProber)?;

    let mut metrics = MetricSink::new();
    let start = Instant::now();
    let success = run_prober(kind, target, module, &mut metrics).await;
    let duration = start.elapsed();

    metrics.push("probe_duration_seconds", duration.as_secs_f64());
    metrics.push("probe_success", if success { 1.0 } else { 0.0 });
    observer.observe(module_name, success, duration);

    if success {
        debug!(target = %target, module = module_name, duration_ms = duration.as_millis(), "Probe succeeded");
    } else {
        info!(target = %target, module = module_name, duration_ms = duration.as_millis(), "Probe failed");
    }

    Ok(ProbeResult {
        metrics,
        success,
        duration,
    })
}

async fn run_prober(kind: ProberKind, target: &str, module: &Module, sink: &mut MetricSink) -> bool {
    match kind {
        ProberKind::Http => HttpProber::new().probe(target, module, sink).await,
        ProberKind::Tcp => TcpProber.probe(target, module, sink).await,
        ProberKind::Icmp => IcmpProber.probe(target, module, sink).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryResponseStep;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn config_with(name: &str, module: Module) -> Config {
        let mut config = Config::default();
        config.modules.insert(name.to_string(), module);
        config
    }

    #[test]
    fn test_request_defaults_module() {
        let request = ProbeRequest::new(Some("example.com".into()), None).unwrap();
        assert_eq!(request.module, DEFAULT_MODULE);

        let request = ProbeRequest::new(Some("example.com".into()), Some(String::new())).unwrap();
        assert_eq!(request.module, DEFAULT_MODULE);

        let request = ProbeRequest::new(Some("example.com".into()), Some("tcp_connect".into())).unwrap();
        assert_eq!(request.module, "tcp_connect");
    }

    #[test]
    fn test_request_requires_target() {
        assert_eq!(ProbeRequest::new(None, None), Err(ProbeError::MissingTarget));
        assert_eq!(
            ProbeRequest::new(Some(String::new()), Some("http2xx".into())),
            Err(ProbeError::MissingTarget)
        );
    }

    #[tokio::test]
    async fn test_unknown_module_is_not_observed() {
        let mut observer = MockProbeObserver::new();
        observer.expect_observe().never();

        let err = execute("127.0.0.1:1", "missing", &Config::default(), &observer)
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::UnknownModule("missing".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_prober_is_not_observed() {
        let mut observer = MockProbeObserver::new();
        observer.expect_observe().never();

        let mut module = Module::new(ProberKind::Tcp, Duration::from_secs(1));
        module.prober = "gopher".to_string();
        let config = config_with("weird", module);

        let err = execute("127.0.0.1:1", "weird", &config, &observer)
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::UnknownProber("gopher".to_string()));
    }

    #[tokio::test]
    async fn test_failed_probe_appends_trailing_metrics() {
        let mut observer = MockProbeObserver::new();
        observer
            .expect_observe()
            .withf(|module, success, _| module == "tcp_connect" && !*success)
            .times(1)
            .return_const(());

        let config = config_with(
            "tcp_connect",
            Module::new(ProberKind::Tcp, Duration::from_millis(200)),
        );

        // Nothing listens on port 1.
        let result = execute("127.0.0.1:1", "tcp_connect", &config, &observer)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            result.metrics.names(),
            vec!["probe_duration_seconds", "probe_success"]
        );
        assert_eq!(result.metrics.get("probe_success"), Some(0.0));
    }

    #[tokio::test]
    async fn test_successful_probe_is_observed_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"SSH-2.0-test\r\n").await.unwrap();
            let mut line = String::new();
            let _ = BufReader::new(stream).read_line(&mut line).await;
        });

        let mut module = Module::new(ProberKind::Tcp, Duration::from_secs(2));
        module.tcp.steps = vec![QueryResponseStep::expect("^SSH-2.0-")];
        let config = config_with("ssh_banner", module);

        let mut observer = MockProbeObserver::new();
        observer
            .expect_observe()
            .withf(|module, success, _| module == "ssh_banner" && *success)
            .times(1)
            .return_const(());

        let result = execute(&addr.to_string(), "ssh_banner", &config, &observer)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.metrics.get("probe_success"), Some(1.0));
        assert_eq!(
            result.metrics.get("probe_duration_seconds"),
            Some(result.duration.as_secs_f64())
        );
    }

    #[tokio::test]
    async fn test_execute_request_uses_request_fields() {
        let config = config_with(
            "tcp_connect",
            Module::new(ProberKind::Tcp, Duration::from_millis(200)),
        );
        let request = ProbeRequest::new(Some("127.0.0.1:1".into()), Some("tcp_connect".into())).unwrap();

        let result = execute_request(&request, &config, &NoopObserver).await.unwrap();
        assert!(!result.success);
    }
}
