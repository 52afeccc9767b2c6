// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Prometheus metrics for the scrape relay agent
//!
//! Exports:
//! - Poll errors (relay could not be polled or returned garbage)
//! - Push errors (result could not be delivered to the relay)
//! - Scrape errors (job failed and an error result was synthesized)
//! - In-flight jobs (spawned but not yet pushed)
//!
//! Each [`AgentMetrics`] owns its registry and is handed to the components
//! that record into it, so tests get isolated counters.

use prometheus::{IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Agent counters and their registry
pub struct AgentMetrics {
    registry: Registry,
    poll_errors: IntCounter,
    push_errors: IntCounter,
    scrape_errors: IntCounter,
    inflight_jobs: IntGauge,
}

impl AgentMetrics {
    /// Create and register all agent metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let poll_errors = IntCounter::with_opts(Opts::new(
            "scrape_relay_agent_poll_errors_total",
            "Number of poll errors",
        ))?;
        let push_errors = IntCounter::with_opts(Opts::new(
            "scrape_relay_agent_push_errors_total",
            "Number of push errors",
        ))?;
        let scrape_errors = IntCounter::with_opts(Opts::new(
            "scrape_relay_agent_scrape_errors_total",
            "Number of scrape errors",
        ))?;
        let inflight_jobs = IntGauge::with_opts(Opts::new(
            "scrape_relay_agent_inflight_jobs",
            "Jobs claimed from the relay whose result has not been pushed yet",
        ))?;

        registry.register(Box::new(poll_errors.clone()))?;
        registry.register(Box::new(push_errors.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;
        registry.register(Box::new(inflight_jobs.clone()))?;

        Ok(Self {
            registry,
            poll_errors,
            push_errors,
            scrape_errors,
            inflight_jobs,
        })
    }

    pub fn record_poll_error(&self) {
        self.poll_errors.inc();
    }

    pub fn record_push_error(&self) {
        self.push_errors.inc();
    }

    pub fn record_scrape_error(&self) {
        self.scrape_errors.inc();
    }

    pub fn job_started(&self) {
        self.inflight_jobs.inc();
    }

    pub fn job_finished(&self) {
        self.inflight_jobs.dec();
    }

    pub fn poll_errors(&self) -> u64 {
        self.poll_errors.get()
    }

    pub fn push_errors(&self) -> u64 {
        self.push_errors.get()
    }

    pub fn scrape_errors(&self) -> u64 {
        self.scrape_errors.get()
    }

    pub fn inflight_jobs(&self) -> i64 {
        self.inflight_jobs.get()
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let metrics = AgentMetrics::new().unwrap();

        metrics.record_poll_error();
        metrics.record_poll_error();
        metrics.record_push_error();

        assert_eq!(metrics.poll_errors(), 2);
        assert_eq!(metrics.push_errors(), 1);
        assert_eq!(metrics.scrape_errors(), 0);
    }

    #[test]
    fn test_separate_instances_do_not_share_counts() {
        let a = AgentMetrics::new().unwrap();
        let b = AgentMetrics::new().unwrap();

        a.record_scrape_error();

        assert_eq!(a.scrape_errors(), 1);
        assert_eq!(b.scrape_errors(), 0);
    }

    #[test]
    fn test_inflight_gauge() {
        let metrics = AgentMetrics::new().unwrap();

        metrics.job_started();
        metrics.job_started();
        metrics.job_finished();

        assert_eq!(metrics.inflight_jobs(), 1);
    }

    #[test]
    fn test_gather_produces_output() {
        let metrics = AgentMetrics::new().unwrap();
        metrics.record_scrape_error();

        let output = metrics.gather();

        assert!(output.contains("scrape_relay_agent_poll_errors_total 0"));
        assert!(output.contains("scrape_relay_agent_scrape_errors_total 1"));
        assert!(output.contains("scrape_relay_agent_inflight_jobs 0"));
    }
}
