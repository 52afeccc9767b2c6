// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job execution
//!
//! The executor turns a [`Job`] into a [`ScrapeResult`]. Every failure
//! (missing timeout, denied port, unreadable token, transport error,
//! deadline) becomes a synthesized `500` result, so every job that was
//! claimed produces something to push.
//!
//! Target rewriting happens in this order:
//!
//! 1. `_scheme=https` in the query upgrades the scheme and is removed
//! 2. a configured token adds `Authorization: Bearer` and forces https
//! 3. the explicit port is checked against the allow-list
//! 4. with `use_localhost`, the host becomes `127.0.0.1`
//! 5. in federation mode, the target is replaced by the federation endpoint

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{
    AUTHORIZATION, CONNECTION, CONTENT_LENGTH, HOST, HeaderValue, PROXY_AUTHORIZATION, TE,
    TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use http::{HeaderMap, Method};
use reqwest::Client;
use tokio::time::Instant;
use url::Url;

use crate::config::{AgentConfig, AllowedPort, LOOPBACK_HOST};
use crate::error::JobError;
use crate::job::{Job, ScrapeResult};
use crate::metrics::AgentMetrics;
use crate::transport::TransportErrorKind;

/// Query parameter that selects the scrape scheme.
pub const SCHEME_PARAM: &str = "_scheme";

/// Outcome of one job, with the deadline the push leg should honor.
#[derive(Debug)]
pub struct Execution {
    pub result: ScrapeResult,
    /// `None` when the job never had a usable deadline
    pub deadline: Option<Instant>,
}

/// A rewritten scrape, ready to send
#[derive(Debug)]
pub struct PreparedScrape {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Executes jobs against local targets
#[derive(Clone)]
pub struct Executor {
    client: Client,
    config: Arc<AgentConfig>,
    metrics: Arc<AgentMetrics>,
}

impl Executor {
    pub fn new(client: Client, config: Arc<AgentConfig>, metrics: Arc<AgentMetrics>) -> Self {
        Self {
            client,
            config,
            metrics,
        }
    }

    /// Run one job to completion. Never fails; errors become results.
    pub async fn execute(&self, job: &Job) -> Execution {
        let deadline = match job.deadline() {
            Ok(deadline) => deadline,
            Err(err) => return self.failed(job, None, err),
        };

        match self.scrape(job, deadline).await {
            Ok(result) => {
                tracing::info!(
                    scrape_id = %job.scrape_id(),
                    status = result.status.as_u16(),
                    bytes = result.body.len(),
                    "Retrieved scrape response"
                );
                Execution {
                    result,
                    deadline: Some(deadline),
                }
            }
            Err(err) => self.failed(job, Some(deadline), err),
        }
    }

    /// Apply the rewrite rules to a job without sending anything.
    pub async fn prepare(&self, job: &Job) -> Result<PreparedScrape, JobError> {
        let mut url = job.url.clone();
        let mut headers = forwardable_headers(&job.headers);

        apply_scheme_override(&mut url)?;

        if let Some(path) = &self.config.token_path {
            let token = read_token(path).await?;
            headers.insert(AUTHORIZATION, bearer(&token)?);
            set_scheme(&mut url, "https")?;
        }

        check_port(job.port, self.config.allow_port)?;

        if self.config.use_localhost {
            rewrite_to_loopback(&mut url, job.port)?;
        }

        match &self.config.federation {
            Some(federation) => {
                let endpoint = federation
                    .endpoint()
                    .map_err(|err| JobError::InvalidTarget {
                        url: federation.url.to_string(),
                        reason: err.to_string(),
                    })?;
                Ok(PreparedScrape {
                    method: Method::GET,
                    url: endpoint,
                    headers,
                    body: Bytes::new(),
                })
            }
            None => Ok(PreparedScrape {
                method: job.method.clone(),
                url,
                headers,
                body: job.body.clone(),
            }),
        }
    }

    async fn scrape(&self, job: &Job, deadline: Instant) -> Result<ScrapeResult, JobError> {
        let prepared = self.prepare(job).await?;
        let url = prepared.url.to_string();

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(JobError::DeadlineExceeded { url });
        }

        tracing::debug!(scrape_id = %job.scrape_id(), url = %url, "Scraping target");

        let request = self
            .client
            .request(prepared.method, prepared.url)
            .headers(prepared.headers)
            .body(prepared.body)
            .timeout(remaining);

        // The body read is bounded too, not just the response head.
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(ScrapeResult {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout_at(deadline, exchange).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(source)) if source.is_timeout() => Err(JobError::DeadlineExceeded { url }),
            Ok(Err(source)) => Err(JobError::Scrape {
                kind: TransportErrorKind::classify(&source),
                url,
                source,
            }),
            Err(_) => Err(JobError::DeadlineExceeded { url }),
        }
    }

    fn failed(&self, job: &Job, deadline: Option<Instant>, err: JobError) -> Execution {
        tracing::error!(scrape_id = %job.scrape_id(), error = %err, "Scrape failed");
        self.metrics.record_scrape_error();
        Execution {
            result: ScrapeResult::from_error(&err),
            deadline,
        }
    }
}

/// Copy of the job headers minus anything scoped to the relay connection.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in [
        CONNECTION,
        CONTENT_LENGTH,
        HOST,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ] {
        forwarded.remove(name);
    }
    forwarded.remove("keep-alive");
    forwarded.remove("proxy-connection");
    forwarded
}

/// Honor `_scheme=https`: upgrade the scheme and drop every `_scheme`
/// parameter. Any other value leaves the URL untouched.
pub fn apply_scheme_override(url: &mut Url) -> Result<(), JobError> {
    let upgrade = url
        .query_pairs()
        .find(|(k, _)| *k == SCHEME_PARAM)
        .is_some_and(|(_, v)| v == "https");
    if !upgrade {
        return Ok(());
    }

    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| *k != SCHEME_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }

    set_scheme(url, "https")
}

/// Reject explicit ports outside the allow-list. Jobs without an explicit
/// port are not restricted.
pub fn check_port(port: Option<u16>, allowed: AllowedPort) -> Result<(), JobError> {
    match port {
        Some(port) if !allowed.permits(port) => Err(JobError::PortNotAllowed(port)),
        _ => Ok(()),
    }
}

/// Point the target at the loopback address, keeping the explicit port.
pub fn rewrite_to_loopback(url: &mut Url, port: Option<u16>) -> Result<(), JobError> {
    let Some(port) = port else {
        return Ok(());
    };
    let original = url.to_string();
    let invalid = || JobError::InvalidTarget {
        url: original.clone(),
        reason: "cannot rewrite host to loopback".to_string(),
    };
    url.set_host(Some(LOOPBACK_HOST)).map_err(|_| invalid())?;
    url.set_port(Some(port)).map_err(|_| invalid())
}

fn set_scheme(url: &mut Url, scheme: &str) -> Result<(), JobError> {
    url.set_scheme(scheme).map_err(|_| JobError::InvalidTarget {
        url: url.to_string(),
        reason: format!("cannot switch scheme to {}", scheme),
    })
}

async fn read_token(path: &Path) -> Result<String, JobError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| JobError::TokenRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(raw.trim().to_string())
}

fn bearer(token: &str) -> Result<HeaderValue, JobError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| JobError::InvalidToken)?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FederationSettings, TlsSettings};
    use crate::job::{CORRELATION_ID_HEADER, SCRAPE_TIMEOUT_HEADER};
    use crate::transport::build_client;
    use http::Request;
    use std::io::Write;

    fn job(uri: &str) -> Job {
        let mut request = Request::new(Bytes::new());
        *request.uri_mut() = uri.parse().unwrap();
        let headers = request.headers_mut();
        headers.insert(CORRELATION_ID_HEADER, HeaderValue::from_static("7"));
        headers.insert(SCRAPE_TIMEOUT_HEADER, HeaderValue::from_static("10"));
        headers.insert(HOST, HeaderValue::from_static("relay.example.com"));
        headers.insert("accept", HeaderValue::from_static("text/plain"));
        Job::from_request(request).unwrap()
    }

    fn executor(config: AgentConfig) -> Executor {
        Executor::new(
            build_client(&TlsSettings::default()).unwrap(),
            Arc::new(config),
            Arc::new(AgentMetrics::new().unwrap()),
        )
    }

    fn config() -> AgentConfig {
        AgentConfig::new("node1", "http://relay:8080").unwrap()
    }

    #[test]
    fn test_scheme_override() {
        let mut url: Url = "http://node1:9100/metrics?_scheme=https&a=b&_scheme=x"
            .parse()
            .unwrap();
        apply_scheme_override(&mut url).unwrap();
        assert_eq!(url.as_str(), "https://node1:9100/metrics?a=b");

        let mut url: Url = "http://node1:9100/metrics?_scheme=https".parse().unwrap();
        apply_scheme_override(&mut url).unwrap();
        assert_eq!(url.as_str(), "https://node1:9100/metrics");
    }

    #[test]
    fn test_scheme_override_other_values_ignored() {
        let mut url: Url = "http://node1:9100/metrics?_scheme=http".parse().unwrap();
        apply_scheme_override(&mut url).unwrap();
        assert_eq!(url.as_str(), "http://node1:9100/metrics?_scheme=http");
    }

    #[test]
    fn test_check_port() {
        assert!(check_port(Some(9100), AllowedPort::Only(9100)).is_ok());
        assert!(matches!(
            check_port(Some(9200), AllowedPort::Only(9100)),
            Err(JobError::PortNotAllowed(9200))
        ));
        assert!(check_port(Some(9200), AllowedPort::Any).is_ok());
        assert!(check_port(None, AllowedPort::Only(9100)).is_ok());
    }

    #[test]
    fn test_rewrite_to_loopback() {
        let mut url: Url = "http://node1.example.com:9100/metrics".parse().unwrap();
        rewrite_to_loopback(&mut url, Some(9100)).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9100/metrics");
    }

    #[test]
    fn test_rewrite_to_loopback_keeps_default_port() {
        let mut url: Url = "http://node1:80/metrics".parse().unwrap();
        rewrite_to_loopback(&mut url, Some(80)).unwrap();
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        assert_eq!(url.port_or_known_default(), Some(80));
    }

    #[tokio::test]
    async fn test_prepare_strips_hop_by_hop_headers() {
        let prepared = executor(config())
            .prepare(&job("http://node1:9100/metrics"))
            .await
            .unwrap();

        assert_eq!(prepared.method, Method::GET);
        assert!(prepared.headers.get(HOST).is_none());
        assert_eq!(prepared.headers.get("accept").unwrap(), "text/plain");
        assert!(prepared.headers.get(SCRAPE_TIMEOUT_HEADER).is_some());
    }

    #[tokio::test]
    async fn test_prepare_with_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "s3cret").unwrap();

        let mut config = config();
        config.token_path = Some(file.path().to_path_buf());

        let prepared = executor(config)
            .prepare(&job("http://node1:9100/metrics"))
            .await
            .unwrap();

        assert_eq!(prepared.url.scheme(), "https");
        let auth = prepared.headers.get(AUTHORIZATION).unwrap();
        assert_eq!(auth, "Bearer s3cret");
        assert!(auth.is_sensitive());
    }

    #[tokio::test]
    async fn test_prepare_with_missing_token_file() {
        let mut config = config();
        config.token_path = Some("/nonexistent/token".into());

        let result = executor(config)
            .prepare(&job("http://node1:9100/metrics"))
            .await;
        assert!(matches!(result, Err(JobError::TokenRead { .. })));
    }

    #[tokio::test]
    async fn test_prepare_localhost_allow_list() {
        let mut config = config();
        config.use_localhost = true;
        config.allow_port = AllowedPort::Only(9100);
        let executor = executor(config);

        let prepared = executor
            .prepare(&job("http://node1:9100/metrics"))
            .await
            .unwrap();
        assert_eq!(prepared.url.as_str(), "http://127.0.0.1:9100/metrics");

        let denied = executor.prepare(&job("http://node1:9200/metrics")).await;
        assert!(matches!(denied, Err(JobError::PortNotAllowed(9200))));
    }

    #[tokio::test]
    async fn test_prepare_federation() {
        let mut config = config();
        config.federation = Some(FederationSettings {
            url: "http://prometheus:9090/".parse().unwrap(),
            matches: vec!["up".to_string()],
        });

        let prepared = executor(config)
            .prepare(&job("http://node1:9100/metrics"))
            .await
            .unwrap();

        assert_eq!(prepared.method, Method::GET);
        assert_eq!(
            prepared.url.as_str(),
            "http://prometheus:9090/federate?match%5B%5D=up"
        );
    }

    #[tokio::test]
    async fn test_execute_missing_timeout_synthesizes_error() {
        let mut request = Request::new(Bytes::new());
        *request.uri_mut() = "http://127.0.0.1:1/metrics".parse().unwrap();
        let job = Job::from_request(request).unwrap();

        let metrics = Arc::new(AgentMetrics::new().unwrap());
        let executor = Executor::new(
            build_client(&TlsSettings::default()).unwrap(),
            Arc::new(config()),
            metrics.clone(),
        );

        let execution = executor.execute(&job).await;

        assert!(execution.result.is_error());
        assert!(execution.deadline.is_none());
        assert_eq!(metrics.scrape_errors(), 1);
    }
}
