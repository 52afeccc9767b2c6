// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Scrape Relay Agent Library
//!
//! The agent runs next to scrape targets that a monitoring server cannot
//! reach directly. It long-polls a relay for scrape jobs, performs each
//! scrape locally and pushes the raw response back to the relay, which hands
//! it to the waiting server.
//!
//! # Modules
//!
//! - [`config`] - Flags, environment and validated agent configuration
//! - [`transport`] - Shared pooled HTTP(S) client and TLS setup
//! - [`backoff`] - Exponential backoff for failed polls
//! - [`job`] - Scrape jobs and results
//! - [`poll`] - Claiming jobs from the relay
//! - [`executor`] - Target rewriting and scraping
//! - [`push`] - Delivering results to the relay
//! - [`coordinator`] - Poll loop, job tasks and shutdown drain
//! - [`metrics`] - Agent failure counters
//! - [`metrics_server`] - `GET /metrics` endpoint

pub mod backoff;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod metrics_server;
pub mod poll;
pub mod push;
pub mod transport;
