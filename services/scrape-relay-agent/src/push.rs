// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Push leg: deliver a scrape result back to the relay

use std::time::Duration;

use http::{HeaderValue, Response};
use reqwest::Client;
use tokio::time::Instant;
use url::Url;

use crate::error::PushError;
use crate::job::{CORRELATION_ID_HEADER, REMAINING_TIMEOUT_HEADER, ScrapeResult};
use crate::transport::TransportErrorKind;

/// Sends results to `<proxy>/push`
#[derive(Clone)]
pub struct Pusher {
    client: Client,
    push_url: Url,
    push_grace: Duration,
}

impl Pusher {
    pub fn new(client: Client, push_url: Url, push_grace: Duration) -> Self {
        Self {
            client,
            push_url,
            push_grace,
        }
    }

    /// Push one result, tagged with its correlation id.
    ///
    /// The header carries the job's true remaining time; the push itself
    /// gets at least the push grace, so results finishing near or past the
    /// deadline still reach the relay.
    pub async fn push(
        &self,
        id: &HeaderValue,
        deadline: Option<Instant>,
        result: ScrapeResult,
    ) -> Result<(), PushError> {
        let now = Instant::now();
        let remaining = deadline
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or_default();
        let bound = push_bound(remaining, self.push_grace);

        let body = encode_result(id, remaining, result)?;

        tracing::debug!(
            scrape_id = %String::from_utf8_lossy(id.as_bytes()),
            url = %self.push_url,
            bytes = body.len(),
            "Pushing scrape result"
        );

        let response = self
            .client
            .post(self.push_url.clone())
            .body(body)
            .timeout(bound)
            .send()
            .await
            .map_err(|source| PushError::Transport {
                kind: TransportErrorKind::classify(&source),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Status(status));
        }
        Ok(())
    }
}

/// Time allowed for the push request itself.
pub fn push_bound(remaining: Duration, push_grace: Duration) -> Duration {
    remaining.max(push_grace)
}

/// Serialize a result as a raw HTTP response carrying the push headers.
///
/// The correlation id is echoed byte for byte.
pub fn encode_result(
    id: &HeaderValue,
    remaining: Duration,
    result: ScrapeResult,
) -> Result<bytes::Bytes, PushError> {
    let mut response = Response::new(result.body);
    *response.status_mut() = result.status;
    *response.headers_mut() = result.headers;

    let headers = response.headers_mut();
    headers.insert(CORRELATION_ID_HEADER, id.clone());
    headers.insert(
        REMAINING_TIMEOUT_HEADER,
        HeaderValue::from_str(&format!("{:.6}", remaining.as_secs_f64()))?,
    );

    Ok(relay_framing::encode_response(&response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use pretty_assertions::assert_eq;

    fn result() -> ScrapeResult {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        ScrapeResult {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"up 1\n"),
        }
    }

    #[test]
    fn test_encode_result_headers() {
        let id = HeaderValue::from_static("42");
        let encoded = encode_result(&id, Duration::from_millis(2500), result()).unwrap();
        let decoded = relay_framing::decode_response(&encoded).unwrap();

        assert_eq!(decoded.status(), StatusCode::OK);
        assert_eq!(decoded.headers().get(CORRELATION_ID_HEADER).unwrap(), "42");
        assert_eq!(
            decoded.headers().get(REMAINING_TIMEOUT_HEADER).unwrap(),
            "2.500000"
        );
        assert_eq!(decoded.headers().get("content-type").unwrap(), "text/plain");
        assert_eq!(decoded.body().as_ref(), b"up 1\n");
    }

    #[test]
    fn test_encode_result_expired_deadline() {
        let id = HeaderValue::from_static("42");
        let encoded = encode_result(&id, Duration::ZERO, result()).unwrap();
        let decoded = relay_framing::decode_response(&encoded).unwrap();

        assert_eq!(
            decoded.headers().get(REMAINING_TIMEOUT_HEADER).unwrap(),
            "0.000000"
        );
    }

    #[test]
    fn test_encode_result_echoes_opaque_id() {
        let id = HeaderValue::from_bytes(b"job-\xc3\xa9").unwrap();
        let encoded = encode_result(&id, Duration::ZERO, result()).unwrap();
        let decoded = relay_framing::decode_response(&encoded).unwrap();

        assert_eq!(
            decoded.headers().get(CORRELATION_ID_HEADER).unwrap().as_bytes(),
            b"job-\xc3\xa9"
        );
    }

    #[test]
    fn test_push_bound_never_below_grace() {
        let grace = Duration::from_secs(5);

        assert_eq!(push_bound(Duration::from_millis(1), grace), grace);
        assert_eq!(push_bound(Duration::ZERO, grace), grace);
        assert_eq!(
            push_bound(Duration::from_secs(8), grace),
            Duration::from_secs(8)
        );
    }
}
