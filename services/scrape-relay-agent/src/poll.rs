// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Poll leg: claim the next scrape job from the relay

use reqwest::Client;
use url::Url;

use crate::error::{JobDecodeError, PollError};
use crate::job::Job;
use crate::transport::TransportErrorKind;

/// Long-polls `<proxy>/poll` for jobs addressed to one FQDN
#[derive(Clone)]
pub struct Poller {
    client: Client,
    poll_url: Url,
    fqdn: String,
}

impl Poller {
    pub fn new(client: Client, poll_url: Url, fqdn: String) -> Self {
        Self {
            client,
            poll_url,
            fqdn,
        }
    }

    /// Wait for the relay to hand out a job.
    ///
    /// The relay holds the request open until a job is ready, so no overall
    /// timeout is applied; the connect timeout still bounds dead relays.
    pub async fn poll(&self) -> Result<Job, PollError> {
        let response = self
            .client
            .post(self.poll_url.clone())
            .body(self.fqdn.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let request = relay_framing::decode_request(&body).map_err(JobDecodeError::from)?;
        let job = Job::from_request(request)?;

        tracing::info!(scrape_id = %job.scrape_id(), url = %job.url, "Got scrape request");
        Ok(job)
    }
}

fn transport_error(source: reqwest::Error) -> PollError {
    PollError::Transport {
        kind: TransportErrorKind::classify(&source),
        source,
    }
}
