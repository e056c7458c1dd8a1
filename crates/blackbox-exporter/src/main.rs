//! Blackbox exporter binary

use blackbox_exporter::{Args, ExporterServer, LogFormat, MetricsRegistry, load_from_file};
use clap::Parser;
use probe::ProberKind;
use probe::probers::icmp::check_privileges;
use std::sync::Arc;

#[tokio::main]
async fn main() -> common::Result<()> {
    let args = Args::parse();

    match args.log_format {
        LogFormat::Text => common::logging::init(&args.log_level),
        LogFormat::Json => common::logging::init_json(&args.log_level),
    }

    tracing::info!("Starting blackbox exporter");

    let config = match load_from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %args.config_file.display(), error = %e, "Error loading config");
            return Err(e.into());
        }
    };
    tracing::info!(modules = config.modules.len(), "Loaded config file");

    // Raw sockets are only needed when some module pings.
    if config.uses_prober(ProberKind::Icmp) {
        if let Err(e) = check_privileges() {
            tracing::error!(error = %e, "Cannot open raw ICMP socket");
            return Err(common::Error::privilege(e));
        }
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let server = ExporterServer::new(Arc::new(config), metrics, args.bind_address());

    server.run().await
}
