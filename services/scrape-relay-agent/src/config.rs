// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Agent configuration
//!
//! Command-line flags (each also settable from the environment) are parsed by
//! [`AgentArgs`] and validated into an immutable [`AgentConfig`], which is
//! shared by every component behind an `Arc`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::ConfigError;

/// Default address for the metrics endpoint.
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9369";

/// Loopback address used when `--use-localhost` is set.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

const DEFAULT_RETRY_INITIAL_WAIT: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_MAX_WAIT: Duration = Duration::from_secs(5);
const DEFAULT_PUSH_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(
    name = "scrape-relay-agent",
    version,
    about = "Polls a scrape relay for jobs, scrapes local targets and pushes the results back"
)]
pub struct AgentArgs {
    /// FQDN to register with (defaults to the local host name)
    #[arg(long, env = "AGENT_FQDN")]
    pub fqdn: Option<String>,

    /// Relay to poll for scrape jobs
    #[arg(long, env = "PROXY_URL")]
    pub proxy_url: Option<String>,

    /// CA certificate bundle (PEM) to verify peers against
    #[arg(long, env = "TLS_CACERT")]
    pub tls_cacert: Option<PathBuf>,

    /// Client certificate (PEM)
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Disable TLS certificate verification
    #[arg(long, env = "INSECURE_SKIP_VERIFY")]
    pub insecure_skip_verify: bool,

    /// Serve agent metrics at this address (empty disables)
    #[arg(long, env = "METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: String,

    /// Use the OAuth 2.0 bearer token found in this file for scrape requests
    #[arg(long, env = "TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// Scrape 127.0.0.1 instead of the host named in the job
    #[arg(long, env = "USE_LOCALHOST")]
    pub use_localhost: bool,

    /// Restrict scrapes to this port ("*" allows any)
    #[arg(long, env = "ALLOW_PORT", default_value = "*")]
    pub allow_port: String,

    /// Wait after the first failed poll
    #[arg(long, env = "RETRY_INITIAL_WAIT", default_value = "1s", value_parser = humantime::parse_duration)]
    pub retry_initial_wait: Duration,

    /// Maximum wait between failed polls
    #[arg(long, env = "RETRY_MAX_WAIT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub retry_max_wait: Duration,

    /// Push time bound used once a job's own deadline is gone
    #[arg(long, env = "PUSH_GRACE", default_value = "5s", value_parser = humantime::parse_duration)]
    pub push_grace: Duration,

    /// How long shutdown waits for in-flight jobs
    #[arg(long, env = "DRAIN_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub drain_timeout: Duration,

    /// Scrape this federation endpoint instead of the job's target
    #[arg(long, env = "FEDERATE_URL")]
    pub federate_url: Option<String>,

    /// Series selector sent as match[] to the federation endpoint
    /// (repeatable; several may be separated by `;`)
    #[arg(long = "match", env = "FEDERATE_MATCH", value_delimiter = ';')]
    pub matches: Vec<String>,
}

impl AgentArgs {
    /// Validate the arguments and build the agent configuration
    pub fn into_config(self) -> Result<AgentConfig, ConfigError> {
        let proxy_url = self
            .proxy_url
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingProxyUrl)?;

        let federation = match self.federate_url {
            Some(url) => Some(FederationSettings {
                url: normalize_base_url(&url)?,
                matches: self.matches,
            }),
            None => None,
        };

        let config = AgentConfig {
            fqdn: self.fqdn.unwrap_or_else(default_fqdn),
            proxy_url: normalize_base_url(&proxy_url)?,
            tls: TlsSettings {
                ca_cert: self.tls_cacert,
                client_cert: self.tls_cert,
                client_key: self.tls_key,
                insecure_skip_verify: self.insecure_skip_verify,
            },
            metrics_addr: parse_metrics_addr(&self.metrics_addr)?,
            token_path: self.token_path,
            use_localhost: self.use_localhost,
            allow_port: self.allow_port.parse()?,
            retry_initial_wait: self.retry_initial_wait,
            retry_max_wait: self.retry_max_wait,
            push_grace: self.push_grace,
            drain_timeout: self.drain_timeout,
            federation,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Which target ports the agent may scrape
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowedPort {
    /// Any port ("*")
    Any,
    /// Exactly this port
    Only(u16),
}

impl AllowedPort {
    /// Whether an explicit target port passes the allow-list
    pub fn permits(&self, port: u16) -> bool {
        match self {
            AllowedPort::Any => true,
            AllowedPort::Only(allowed) => *allowed == port,
        }
    }
}

impl FromStr for AllowedPort {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(AllowedPort::Any);
        }
        s.parse()
            .map(AllowedPort::Only)
            .map_err(|_| ConfigError::InvalidAllowPort(s.to_string()))
    }
}

/// TLS material for the shared transport
#[derive(Clone, Debug, Default)]
pub struct TlsSettings {
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub insecure_skip_verify: bool,
}

/// Federation mode: every job is served from one federation endpoint
#[derive(Clone, Debug)]
pub struct FederationSettings {
    /// Base URL of the federating server, normalized to end in `/`
    pub url: Url,
    /// Series selectors, sent as repeated `match[]` parameters
    pub matches: Vec<String>,
}

impl FederationSettings {
    /// Full URL of the federation endpoint including selectors
    pub fn endpoint(&self) -> Result<Url, url::ParseError> {
        let mut url = self.url.join("federate")?;
        url.query_pairs_mut()
            .extend_pairs(self.matches.iter().map(|m| ("match[]", m.as_str())));
        Ok(url)
    }
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Identity sent with every poll
    pub fqdn: String,
    /// Relay base URL, always ending in a single `/`
    pub proxy_url: Url,
    pub tls: TlsSettings,
    /// Metrics endpoint address; `None` disables it
    pub metrics_addr: Option<SocketAddr>,
    pub token_path: Option<PathBuf>,
    pub use_localhost: bool,
    pub allow_port: AllowedPort,
    pub retry_initial_wait: Duration,
    pub retry_max_wait: Duration,
    pub push_grace: Duration,
    pub drain_timeout: Duration,
    pub federation: Option<FederationSettings>,
}

impl AgentConfig {
    /// Configuration with default policy for the given identity and relay
    pub fn new(fqdn: impl Into<String>, proxy_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            fqdn: fqdn.into(),
            proxy_url: normalize_base_url(proxy_url)?,
            tls: TlsSettings::default(),
            metrics_addr: None,
            token_path: None,
            use_localhost: false,
            allow_port: AllowedPort::Any,
            retry_initial_wait: DEFAULT_RETRY_INITIAL_WAIT,
            retry_max_wait: DEFAULT_RETRY_MAX_WAIT,
            push_grace: DEFAULT_PUSH_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            federation: None,
        })
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_localhost && self.allow_port == AllowedPort::Any {
            return Err(ConfigError::LocalhostRequiresPort);
        }
        match (&self.tls.client_cert, &self.tls.client_key) {
            (None, Some(_)) => return Err(ConfigError::KeyWithoutCert),
            (Some(_), None) => return Err(ConfigError::CertWithoutKey),
            _ => {}
        }
        if self
            .federation
            .as_ref()
            .is_some_and(|f| f.matches.is_empty())
        {
            return Err(ConfigError::FederationWithoutMatch);
        }
        if self.retry_initial_wait.is_zero() {
            return Err(ConfigError::ZeroRetryWait);
        }
        Ok(())
    }

    /// URL of a relay leg (`poll` or `push`), resolved against the base URL
    pub fn relay_endpoint(&self, leg: &str) -> Result<Url, ConfigError> {
        self.proxy_url
            .join(leg)
            .map_err(|source| ConfigError::InvalidUrl {
                url: format!("{}{}", self.proxy_url, leg),
                source,
            })
    }
}

/// Parse a base URL and make sure it ends with exactly one `/`
pub fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = format!("{}/", raw.trim().trim_end_matches('/'));
    Url::parse(&normalized).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// Local host name, used as the default agent identity
pub fn default_fqdn() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

fn parse_metrics_addr(raw: &str) -> Result<Option<SocketAddr>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    // ":9369" binds all interfaces
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };
    full.parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidMetricsAddr(raw.to_string()))
}
