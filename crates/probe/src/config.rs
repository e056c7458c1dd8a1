//! Probe module configuration model.
//!
//! A [`Config`] maps module names to [`Module`] definitions. It is loaded once
//! at startup and shared read-only between requests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Module used when a probe request does not name one.
pub const DEFAULT_MODULE: &str = "http2xx";

/// Default per-module timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// All configured probe modules, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub modules: HashMap<String, Module>,
}

impl Config {
    /// Look up a module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Whether any module selects the given prober.
    pub fn uses_prober(&self, kind: ProberKind) -> bool {
        self.modules
            .values()
            .any(|m| m.prober.parse::<ProberKind>().ok() == Some(kind))
    }
}

/// A named, fully configured probe definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Module {
    /// Prober key (`http`, `tcp` or `icmp`). Checked at probe time so that an
    /// unknown key is reported to the requester rather than at startup.
    pub prober: String,

    /// Budget for the whole probe; each prober bounds its own I/O with it.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub http: HttpProbeConfig,

    #[serde(default)]
    pub tcp: TcpProbeConfig,

    #[serde(default)]
    pub icmp: IcmpProbeConfig,
}

impl Module {
    /// Create a module for `kind` with default protocol options.
    pub fn new(kind: ProberKind, timeout: Duration) -> Self {
        Self {
            prober: kind.to_string(),
            timeout,
            http: HttpProbeConfig::default(),
            tcp: TcpProbeConfig::default(),
            icmp: IcmpProbeConfig::default(),
        }
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// The closed set of prober implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProberKind {
    Http,
    Tcp,
    Icmp,
}

impl fmt::Display for ProberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProberKind::Http => write!(f, "http"),
            ProberKind::Tcp => write!(f, "tcp"),
            ProberKind::Icmp => write!(f, "icmp"),
        }
    }
}

impl FromStr for ProberKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ProberKind::Http),
            "tcp" => Ok(ProberKind::Tcp),
            "icmp" => Ok(ProberKind::Icmp),
            other => Err(other.to_string()),
        }
    }
}

/// HTTP prober options.
///
/// Unknown keys are rejected so a misspelt option cannot silently fall back
/// to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpProbeConfig {
    /// Accepted status codes. Empty means any 2xx.
    pub valid_status_codes: Vec<u16>,
    pub method: String,
    pub path: String,
    pub follow_redirects: bool,
    /// Inverted form of `follow_redirects`; takes precedence when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_follow_redirects: Option<bool>,
    pub fail_if_ssl: bool,
    pub fail_if_not_ssl: bool,
    #[serde(alias = "fail_if_matches_regexp")]
    pub fail_if_matches: Vec<String>,
    #[serde(alias = "fail_if_not_matches_regexp")]
    pub fail_if_not_matches: Vec<String>,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            valid_status_codes: Vec::new(),
            method: "GET".to_string(),
            path: "/".to_string(),
            follow_redirects: true,
            no_follow_redirects: None,
            fail_if_ssl: false,
            fail_if_not_ssl: false,
            fail_if_matches: Vec::new(),
            fail_if_not_matches: Vec::new(),
        }
    }
}

impl HttpProbeConfig {
    /// Whether redirects are followed, honouring `no_follow_redirects`.
    pub fn follows_redirects(&self) -> bool {
        match self.no_follow_redirects {
            Some(no_follow) => !no_follow,
            None => self.follow_redirects,
        }
    }
}

/// TCP prober options: a script of expect/send steps run in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpProbeConfig {
    #[serde(default, alias = "query_response")]
    pub steps: Vec<QueryResponseStep>,
}

/// One expect-then-send unit of a TCP script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryResponseStep {
    /// Pattern a received line must match before `send` is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,

    /// Line to write; `${N}` refers to capture group N of the matched line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,
}

impl QueryResponseStep {
    pub fn expect(pattern: impl Into<String>) -> Self {
        Self {
            expect: Some(pattern.into()),
            send: None,
        }
    }

    pub fn send(line: impl Into<String>) -> Self {
        Self {
            expect: None,
            send: Some(line.into()),
        }
    }

    pub fn expect_send(pattern: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            expect: Some(pattern.into()),
            send: Some(line.into()),
        }
    }
}

/// ICMP prober options. The echo is bounded by the module timeout only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcmpProbeConfig {}
