//! HTTP/HTTPS prober.
//!
//! Performs one request/response cycle and judges it by status code, body
//! content and whether the connection was encrypted.

use super::Prober;
use crate::config::{HttpProbeConfig, Module};
use crate::metric::MetricSink;
use async_trait::async_trait;
use regex::bytes::Regex;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::redirect::{Attempt, Policy};
use reqwest::tls::TlsInfo;
use reqwest::{Method, Response};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

/// Redirect hops followed before the probe is failed.
pub const MAX_REDIRECTS: usize = 10;

/// HTTP prober
///
/// Servers are verified against the bundled web PKI roots plus any roots
/// added with [`HttpProber::with_root_certificates`].
#[derive(Debug, Clone, Default)]
pub struct HttpProber {
    extra_roots: Vec<CertificateDer<'static>>,
}

impl HttpProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `roots` in addition to the bundled roots.
    pub fn with_root_certificates(roots: Vec<CertificateDer<'static>>) -> Self {
        Self { extra_roots: roots }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &str, module: &Module, sink: &mut MetricSink) -> bool {
        let config = &module.http;
        let redirects = Arc::new(RedirectTracker::default());
        let peer_chain = PeerChain::default();

        let tls = match tls_config(&self.extra_roots, peer_chain.clone()) {
            Ok(tls) => tls,
            Err(e) => {
                error!(error = %e, "Failed to build TLS configuration");
                return false;
            }
        };

        let client = match reqwest::Client::builder()
            .timeout(module.timeout)
            .redirect(redirect_policy(config.follows_redirects(), redirects.clone()))
            .use_preconfigured_tls(tls)
            .tls_info(true)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Failed to build HTTP client");
                return false;
            }
        };

        let method = if config.method.is_empty() {
            Method::GET
        } else {
            match Method::from_bytes(config.method.as_bytes()) {
                Ok(method) => method,
                Err(e) => {
                    error!(method = %config.method, error = %e, "Invalid HTTP method");
                    return false;
                }
            }
        };
        let url = request_url(target, &config.path);
        debug!(url = %url, method = %method, "Probing HTTP target");

        // No response at all: nothing to measure.
        let response = match client.request(method, &url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "HTTP request failed");
                return false;
            }
        };

        let status = response.status().as_u16();
        sink.push("probe_http_status_code", f64::from(status));
        sink.push(
            "probe_http_content_length",
            declared_content_length(response.headers()).map(|len| len as f64).unwrap_or(-1.0),
        );
        sink.push("probe_http_redirects", redirects.followed() as f64);

        let redirects_ok = !redirects.exceeded();
        if !redirects_ok {
            warn!(url = %url, max = MAX_REDIRECTS, "Maximum redirects exceeded");
        }

        let status_ok = status_code_ok(status, &config.valid_status_codes);
        if !status_ok {
            warn!(url = %url, status, "Unexpected HTTP status code");
        }

        // TLS details live on the response, which reading the body consumes.
        let tls = TlsState::from_response(&response, &peer_chain);

        let mut regex_ok = true;
        if status_ok {
            match response.bytes().await {
                Ok(body) => {
                    sink.push("probe_http_actual_content_length", body.len() as f64);
                    if !config.fail_if_matches.is_empty() || !config.fail_if_not_matches.is_empty() {
                        regex_ok = match_regular_expressions(&body, config);
                    }
                }
                Err(e) => {
                    error!(url = %url, error = %e, "Failed to read HTTP body");
                }
            }
        }

        let tls_ok = match tls {
            TlsState::Encrypted { earliest_expiry } => {
                sink.push("probe_http_ssl", 1.0);
                sink.push(
                    "probe_ssl_earliest_cert_expiry",
                    earliest_expiry.unwrap_or(0) as f64,
                );
                !config.fail_if_ssl
            }
            TlsState::Plaintext => {
                sink.push("probe_http_ssl", 0.0);
                !config.fail_if_not_ssl
            }
        };

        redirects_ok && status_ok && regex_ok && tls_ok
    }
}

/// The `Content-Length` the server declared, if any and well formed.
pub fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Prefix `http://` unless the target already names a scheme.
pub fn normalize_target(target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{}", target)
    }
}

fn request_url(target: &str, path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    format!("{}{}", normalize_target(target), path)
}

/// Status evaluation: the configured set when non-empty, otherwise any 2xx.
pub fn status_code_ok(status: u16, valid_status_codes: &[u16]) -> bool {
    if valid_status_codes.is_empty() {
        (200..300).contains(&status)
    } else {
        valid_status_codes.contains(&status)
    }
}

/// Body checks. A pattern that fails to compile fails the probe.
pub fn match_regular_expressions(body: &[u8], config: &HttpProbeConfig) -> bool {
    for expression in &config.fail_if_matches {
        match Regex::new(expression) {
            Ok(re) => {
                if re.is_match(body) {
                    debug!(regexp = %expression, "Body matched fail_if_matches");
                    return false;
                }
            }
            Err(e) => {
                error!(regexp = %expression, error = %e, "Could not compile regular expression");
                return false;
            }
        }
    }

    for expression in &config.fail_if_not_matches {
        match Regex::new(expression) {
            Ok(re) => {
                if !re.is_match(body) {
                    debug!(regexp = %expression, "Body did not match fail_if_not_matches");
                    return false;
                }
            }
            Err(e) => {
                error!(regexp = %expression, error = %e, "Could not compile regular expression");
                return false;
            }
        }
    }

    true
}

/// Earliest non-zero `NotAfter`, as Unix seconds, among DER certificates.
/// Certificates that fail to parse are ignored.
pub fn earliest_cert_expiry<'a>(certs: impl IntoIterator<Item = &'a [u8]>) -> Option<i64> {
    certs
        .into_iter()
        .filter_map(|der| X509Certificate::from_der(der).ok())
        .map(|(_, cert)| cert.validity().not_after.timestamp())
        .filter(|&expiry| expiry != 0)
        .min()
}

enum TlsState {
    Plaintext,
    Encrypted { earliest_expiry: Option<i64> },
}

impl TlsState {
    fn from_response(response: &Response, peer_chain: &PeerChain) -> Self {
        let info = response.extensions().get::<TlsInfo>();
        if info.is_none() && response.url().scheme() != "https" {
            return TlsState::Plaintext;
        }

        let chain = peer_chain.certificates();
        let earliest_expiry = if chain.is_empty() {
            info.and_then(|info| earliest_cert_expiry(info.peer_certificate()))
        } else {
            earliest_cert_expiry(chain.iter().map(|cert| cert.as_ref()))
        };
        TlsState::Encrypted { earliest_expiry }
    }
}

/// Certificates the server presented in the most recent handshake, leaf
/// first.
#[derive(Debug, Clone, Default)]
struct PeerChain(Arc<Mutex<Vec<CertificateDer<'static>>>>);

impl PeerChain {
    fn record(&self, end_entity: &CertificateDer<'_>, intermediates: &[CertificateDer<'_>]) {
        if let Ok(mut chain) = self.0.lock() {
            chain.clear();
            chain.push(end_entity.clone().into_owned());
            chain.extend(intermediates.iter().map(|cert| cert.clone().into_owned()));
        }
    }

    fn certificates(&self) -> Vec<CertificateDer<'static>> {
        self.0.lock().map(|chain| chain.clone()).unwrap_or_default()
    }
}

/// Web PKI verification that also keeps the presented chain, since the
/// client only reports the leaf afterwards.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    chain: PeerChain,
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.chain.record(end_entity, intermediates);
        self.inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn tls_config(
    extra_roots: &[CertificateDer<'static>],
    chain: PeerChain,
) -> Result<ClientConfig, rustls::Error> {
    let provider: Arc<CryptoProvider> = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    for cert in extra_roots {
        roots.add(cert.clone())?;
    }

    let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| rustls::Error::General(e.to_string()))?;

    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(RecordingVerifier { inner, chain }))
        .with_no_client_auth())
}

#[derive(Default)]
struct RedirectTracker {
    followed: AtomicUsize,
    exceeded: AtomicBool,
}

impl RedirectTracker {
    fn followed(&self) -> usize {
        self.followed.load(Ordering::Relaxed)
    }

    fn exceeded(&self) -> bool {
        self.exceeded.load(Ordering::Relaxed)
    }
}

/// Stopping hands the redirect response back as the final response, so a
/// disabled or exhausted redirect chain is still evaluated like any other.
fn redirect_policy(follow: bool, tracker: Arc<RedirectTracker>) -> Policy {
    Policy::custom(move |attempt: Attempt| {
        if !follow {
            return attempt.stop();
        }

        let hops = attempt.previous().len();
        if hops > MAX_REDIRECTS {
            tracker.exceeded.store(true, Ordering::Relaxed);
            attempt.stop()
        } else {
            tracker.followed.store(hops, Ordering::Relaxed);
            attempt.follow()
        }
    })
}
