// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Error types for the scrape relay agent
//!
//! Errors fall into two families:
//!
//! - [`JobError`] covers everything that can go wrong while executing a
//!   single job. These never leave the executor; each one is turned into a
//!   synthesized `500` result and pushed to the relay.
//! - [`PollError`] and [`PushError`] cover talking to the relay itself.
//!   There is no job (or no channel) to report them on, so they are only
//!   counted and logged.

use std::path::PathBuf;

use relay_framing::FramingError;
use thiserror::Error;

use crate::transport::TransportErrorKind;

/// Failure while executing a job. Always converted into an error result.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("missing scrape timeout header {0}")]
    MissingTimeout(&'static str),

    #[error("invalid scrape timeout header value: {0}")]
    InvalidTimeout(String),

    #[error("cannot read token from token-path {}: {source}", .path.display())]
    TokenRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token from token-path is not a valid header value")]
    InvalidToken,

    #[error("client does not have permissions to scrape port {0}")]
    PortNotAllowed(u16),

    #[error("cannot rewrite scrape target {url}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("failed to scrape {url}: {source}")]
    Scrape {
        url: String,
        kind: TransportErrorKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to scrape {url}: deadline exceeded")]
    DeadlineExceeded { url: String },
}

/// A poll response body that could not be turned into a job.
#[derive(Debug, Error)]
pub enum JobDecodeError {
    #[error("error reading request: {0}")]
    Framing(#[from] FramingError),

    #[error("invalid scrape target URL: {0}")]
    Target(#[from] url::ParseError),
}

/// Failure of the poll leg. Counted and retried under backoff.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("error polling ({kind}): {source}")]
    Transport {
        kind: TransportErrorKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("relay returned status {0} for poll")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Decode(#[from] JobDecodeError),
}

/// Failure of the push leg. Counted; the job is dropped.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("error pushing ({kind}): {source}")]
    Transport {
        kind: TransportErrorKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("relay returned status {0} for push")]
    Status(reqwest::StatusCode),

    #[error("invalid push header value: {0}")]
    Header(#[from] http::header::InvalidHeaderValue),
}

/// Startup configuration errors. These abort the process before polling.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--proxy-url flag must be specified")]
    MissingProxyUrl,

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid allow-port {0:?}: expected \"*\" or a port number")]
    InvalidAllowPort(String),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddr(String),

    #[error("client must restrict access on localhost to a single port")]
    LocalhostRequiresPort,

    #[error("--tls-key requires --tls-cert")]
    KeyWithoutCert,

    #[error("--tls-cert requires --tls-key")]
    CertWithoutKey,

    #[error("minimum one --match flag must be specified with --federate-url")]
    FederationWithoutMatch,

    #[error("retry initial wait must be greater than zero")]
    ZeroRetryWait,

    #[error("failed to read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS material in {}: {source}", .path.display())]
    Tls {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
