// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Driver loop
//!
//! The coordinator polls continuously and hands every claimed job to its
//! own task, so a slow target never holds up the next poll. Failed polls
//! are retried under [`Backoff`]; a successful poll resets it.
//!
//! Shutdown is driven by a [`CancellationToken`]: polling stops, then
//! in-flight jobs get up to the drain timeout to execute and push.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::backoff::Backoff;
use crate::config::AgentConfig;
use crate::error::{ConfigError, PollError};
use crate::executor::Executor;
use crate::job::Job;
use crate::metrics::AgentMetrics;
use crate::poll::Poller;
use crate::push::Pusher;

/// Owns the poll loop and the set of in-flight jobs
pub struct Coordinator {
    poller: Poller,
    executor: Executor,
    pusher: Pusher,
    metrics: Arc<AgentMetrics>,
    tracker: TaskTracker,
    retry_initial_wait: Duration,
    retry_max_wait: Duration,
    drain_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        config: Arc<AgentConfig>,
        client: Client,
        metrics: Arc<AgentMetrics>,
    ) -> Result<Self, ConfigError> {
        let poller = Poller::new(
            client.clone(),
            config.relay_endpoint("poll")?,
            config.fqdn.clone(),
        );
        let pusher = Pusher::new(
            client.clone(),
            config.relay_endpoint("push")?,
            config.push_grace,
        );

        Ok(Self {
            poller,
            pusher,
            retry_initial_wait: config.retry_initial_wait,
            retry_max_wait: config.retry_max_wait,
            drain_timeout: config.drain_timeout,
            executor: Executor::new(client, config, metrics.clone()),
            metrics,
            tracker: TaskTracker::new(),
        })
    }

    /// Claim one job and start it in the background.
    ///
    /// Returns once the job is spawned, not once it is pushed.
    pub async fn poll_once(&self) -> Result<(), PollError> {
        let job = self.poller.poll().await?;
        self.spawn_job(job);
        Ok(())
    }

    fn spawn_job(&self, job: Job) {
        let executor = self.executor.clone();
        let pusher = self.pusher.clone();
        let metrics = self.metrics.clone();

        metrics.job_started();
        self.tracker.spawn(async move {
            handle_job(&executor, &pusher, &metrics, job).await;
            metrics.job_finished();
        });
    }

    /// Poll until `shutdown` fires, then drain.
    ///
    /// Returns `true` if every in-flight job finished within the drain
    /// timeout.
    pub async fn run(&self, shutdown: CancellationToken) -> bool {
        let mut backoff = Backoff::new(self.retry_initial_wait, self.retry_max_wait);

        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            match outcome {
                Ok(()) => backoff.reset(),
                Err(err) => {
                    self.metrics.record_poll_error();
                    let wait = backoff.next_interval();
                    tracing::error!(error = %err, retry_in = ?wait, "Error polling");

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        tracing::info!(
            inflight = self.metrics.inflight_jobs(),
            "Polling stopped, draining in-flight jobs"
        );
        self.drain().await
    }

    /// Stop accepting jobs and wait for the running ones to finish.
    pub async fn drain(&self) -> bool {
        self.tracker.close();
        tokio::time::timeout(self.drain_timeout, self.tracker.wait())
            .await
            .is_ok()
    }

    pub fn metrics(&self) -> &Arc<AgentMetrics> {
        &self.metrics
    }
}

async fn handle_job(executor: &Executor, pusher: &Pusher, metrics: &AgentMetrics, job: Job) {
    let execution = executor.execute(&job).await;

    match pusher
        .push(&job.id, execution.deadline, execution.result)
        .await
    {
        Ok(()) => tracing::debug!(scrape_id = %job.scrape_id(), "Pushed scrape result"),
        Err(err) => {
            metrics.record_push_error();
            tracing::error!(
                scrape_id = %job.scrape_id(),
                error = %err,
                "Failed to push scrape response"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsSettings;
    use crate::transport::build_client;

    fn coordinator() -> Coordinator {
        let mut config = AgentConfig::new("node1", "http://127.0.0.1:1").unwrap();
        config.retry_initial_wait = Duration::from_millis(10);
        config.retry_max_wait = Duration::from_millis(20);
        Coordinator::new(
            Arc::new(config),
            build_client(&TlsSettings::default()).unwrap(),
            Arc::new(AgentMetrics::new().unwrap()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_drain_with_nothing_in_flight() {
        assert!(coordinator().drain().await);
    }

    #[tokio::test]
    async fn test_unreachable_relay_counts_poll_errors() {
        let coordinator = coordinator();
        let shutdown = CancellationToken::new();

        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stopper.cancel();
        });

        assert!(coordinator.run(shutdown).await);
        assert!(coordinator.metrics().poll_errors() >= 2);
        assert_eq!(coordinator.metrics().inflight_jobs(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let coordinator = coordinator();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert!(coordinator.run(shutdown).await);
        assert_eq!(coordinator.metrics().poll_errors(), 0);
    }
}
