// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Scrape Relay Agent
//!
//! Polls a relay for scrape jobs, scrapes the requested targets and pushes
//! the results back. Runs until SIGINT or SIGTERM, then drains in-flight
//! jobs before exiting.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scrape_relay_agent::config::AgentArgs;
use scrape_relay_agent::coordinator::Coordinator;
use scrape_relay_agent::metrics::AgentMetrics;
use scrape_relay_agent::{metrics_server, transport};

#[tokio::main]
async fn main() -> Result<()> {
    let args = AgentArgs::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "scrape_relay_agent=info,dropshot=info".to_string()),
        ))
        .init();

    let config = Arc::new(args.into_config().context("Invalid configuration")?);
    info!(
        fqdn = %config.fqdn,
        proxy_url = %config.proxy_url,
        allow_port = ?config.allow_port,
        use_localhost = config.use_localhost,
        "Starting scrape relay agent"
    );

    let metrics = Arc::new(AgentMetrics::new().context("Failed to register metrics")?);

    // The agent keeps working without its metrics endpoint.
    let _metrics_server = match config.metrics_addr {
        Some(addr) => match metrics_server::start(addr, metrics.clone()) {
            Ok(server) => Some(server),
            Err(e) => {
                warn!(address = %addr, error = %e, "Metrics endpoint not started");
                None
            }
        },
        None => None,
    };

    let client = transport::build_client(&config.tls).context("Failed to build HTTP client")?;
    let coordinator = Coordinator::new(config.clone(), client, metrics)
        .context("Failed to resolve relay endpoints")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    if coordinator.run(shutdown).await {
        info!("All in-flight jobs finished");
    } else {
        warn!(
            drain_timeout = ?config.drain_timeout,
            "Drain timed out, abandoning in-flight jobs"
        );
    }

    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt");
    }

    shutdown.cancel();
}
