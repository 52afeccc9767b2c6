// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Scrape jobs and their results
//!
//! A [`Job`] is decoded from the raw request a relay hands out on poll; a
//! [`ScrapeResult`] is what goes back on push. Both are plain structs so the
//! executor never touches wire framing.

use std::borrow::Cow;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use tokio::time::Instant;
use url::Url;

use crate::error::{JobDecodeError, JobError};

/// Job header carrying the scrape timeout in (float) seconds.
pub const SCRAPE_TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout-seconds";

/// Result header carrying the seconds left before the job's deadline.
pub const REMAINING_TIMEOUT_HEADER: &str = "x-prometheus-scrape-timeout";

/// Header linking a job to its result.
pub const CORRELATION_ID_HEADER: &str = "id";

/// One pending scrape, as claimed from the relay.
#[derive(Debug, Clone)]
pub struct Job {
    /// Correlation identifier, opaque bytes echoed on the result
    pub id: HeaderValue,
    pub method: Method,
    pub url: Url,
    /// Port written explicitly in the target authority, if any
    pub port: Option<u16>,
    pub headers: HeaderMap,
    pub body: Bytes,
    received_at: Instant,
}

impl Job {
    /// Build a job from a decoded relay request, stamping the receive time.
    pub fn from_request(request: Request<Bytes>) -> Result<Self, JobDecodeError> {
        let (parts, body) = request.into_parts();

        let id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(""));

        // Url drops ports that match the scheme default; the allow-list
        // needs the port as written.
        let port = parts.uri.port_u16();
        let url = Url::parse(&parts.uri.to_string())?;

        Ok(Self {
            id,
            method: parts.method,
            url,
            port,
            headers: parts.headers,
            body,
            received_at: Instant::now(),
        })
    }

    /// Correlation identifier for log lines.
    pub fn scrape_id(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.id.as_bytes())
    }

    /// Scrape timeout requested by the relay.
    ///
    /// The header is mandatory; nothing is assumed when it is absent.
    pub fn scrape_timeout(&self) -> Result<Duration, JobError> {
        let value = self
            .headers
            .get(SCRAPE_TIMEOUT_HEADER)
            .ok_or(JobError::MissingTimeout(SCRAPE_TIMEOUT_HEADER))?;
        let text = value
            .to_str()
            .map_err(|_| JobError::InvalidTimeout(format!("{:?}", value)))?;
        let seconds: f64 = text
            .trim()
            .parse()
            .map_err(|_| JobError::InvalidTimeout(text.to_string()))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(JobError::InvalidTimeout(text.to_string()));
        }
        Duration::try_from_secs_f64(seconds).map_err(|_| JobError::InvalidTimeout(text.to_string()))
    }

    /// Absolute deadline, measured from when the job was received.
    ///
    /// A timeout too large to represent as an instant is rejected.
    pub fn deadline(&self) -> Result<Instant, JobError> {
        let timeout = self.scrape_timeout()?;
        self.received_at.checked_add(timeout).ok_or_else(|| {
            JobError::InvalidTimeout(format!("{}s is out of range", timeout.as_secs_f64()))
        })
    }
}

/// Outcome of one job: the target's response or a synthesized error.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ScrapeResult {
    /// Stand-in result for a job that failed before or during the scrape.
    pub fn from_error(err: &JobError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: Bytes::from(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.status.is_success()
    }
}
