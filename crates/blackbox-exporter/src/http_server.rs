//! HTTP server for the probe, metrics and landing page endpoints.

use crate::metrics::MetricsRegistry;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use probe::{Config, ProbeRequest, execute_request};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const INDEX_PAGE: &str = r#"<html>
<head><title>Blackbox Exporter</title></head>
<body>
<h1>Blackbox Exporter</h1>
<p><a href="/probe?target=prometheus.io&module=http2xx">Probe prometheus.io for http2xx</a></p>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration, read-only after startup
    pub config: Arc<Config>,
    /// Aggregate probe metrics
    pub metrics: Arc<MetricsRegistry>,
}

/// Query parameters accepted by `/probe`
#[derive(Debug, Default, Deserialize)]
pub struct ProbeParams {
    pub target: Option<String>,
    pub module: Option<String>,
}

/// HTTP server for the exporter
pub struct ExporterServer {
    state: AppState,
    /// Listen address
    listen_addr: String,
}

impl ExporterServer {
    pub fn new(config: Arc<Config>, metrics: Arc<MetricsRegistry>, listen_addr: String) -> Self {
        Self {
            state: AppState { config, metrics },
            listen_addr,
        }
    }

    /// Build the router without binding.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the HTTP server
    pub async fn run(self) -> common::Result<()> {
        info!(listen_addr = %self.listen_addr, "Starting blackbox exporter HTTP server");

        let app = self.router();

        let listener = TcpListener::bind(&self.listen_addr).await.map_err(|e| {
            common::Error::server(format!("failed to bind {}: {}", self.listen_addr, e))
        })?;
        info!(listen_addr = %self.listen_addr, "Listening");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Router with all exporter routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/probe", get(probe_handler))
        .route("/metrics", get(metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Handler for /probe endpoint
pub async fn probe_handler(
    State(state): State<AppState>,
    Query(params): Query<ProbeParams>,
) -> Response {
    let request = match ProbeRequest::new(params.target, params.module) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejected probe request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match execute_request(&request, &state.config, state.metrics.as_ref()).await {
        Ok(result) => (
            StatusCode::OK,
            [("content-type", CONTENT_TYPE)],
            result.metrics.render(),
        )
            .into_response(),
        Err(e) => {
            debug!(target = %request.target, module = %request.module, error = %e, "Rejected probe request");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// Handler for /metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(buffer) => (StatusCode::OK, [("content-type", CONTENT_TYPE)], buffer).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Handler for the landing page
pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}
