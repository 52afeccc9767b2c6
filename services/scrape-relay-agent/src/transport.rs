// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared outbound HTTP(S) client
//!
//! Poll, scrape and push traffic all go through one pooled
//! [`reqwest::Client`]. Cloning it is cheap and shares the pool.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::{Certificate, Client, Identity};

use crate::config::TlsSettings;
use crate::error::ConfigError;

/// TCP connect timeout (includes DNS resolution).
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP keep-alive interval.
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Idle pooled connections kept per host.
pub const MAX_IDLE_PER_HOST: usize = 100;

/// Idle pooled connections are closed after this long.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Coarse classification of a transport failure, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Tls,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Other => "transport",
        };
        f.write_str(s)
    }
}

impl TransportErrorKind {
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportErrorKind::Timeout;
        }

        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            if cause.downcast_ref::<rustls::Error>().is_some() {
                return TransportErrorKind::Tls;
            }
            source = cause.source();
        }

        if err.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        }
    }
}

/// Install the process-wide rustls crypto provider.
///
/// reqwest is built without a bundled provider; one must be installed
/// before the first client is built. Repeated calls are harmless.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Build the shared client from the TLS settings.
pub fn build_client(tls: &TlsSettings) -> Result<Client, ConfigError> {
    install_crypto_provider();

    let mut builder = Client::builder()
        .connect_timeout(DIAL_TIMEOUT)
        .tcp_keepalive(KEEP_ALIVE)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .danger_accept_invalid_certs(tls.insecure_skip_verify);

    if let Some(path) = &tls.ca_cert {
        let pem = read_pem(path)?;
        let certs = Certificate::from_pem_bundle(&pem).map_err(|source| ConfigError::Tls {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), count = certs.len(), "Loaded CA certificates");
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let (Some(cert_path), Some(key_path)) = (&tls.client_cert, &tls.client_key) {
        let mut pem = read_pem(cert_path)?;
        pem.push(b'\n');
        pem.extend_from_slice(&read_pem(key_path)?);
        let identity = Identity::from_pem(&pem).map_err(|source| ConfigError::Tls {
            path: cert_path.clone(),
            source,
        })?;
        builder = builder.identity(identity);
    }

    if tls.insecure_skip_verify {
        tracing::warn!("TLS certificate verification is disabled");
    }

    builder.build().map_err(ConfigError::Client)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}
