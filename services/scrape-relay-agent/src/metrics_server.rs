// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Metrics HTTP endpoint
//!
//! Serves [`AgentMetrics`] in the Prometheus text format at `GET /metrics`.

use std::net::SocketAddr;
use std::sync::Arc;

use dropshot::{
    Body, ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpError, HttpServer,
    HttpServerStarter, RequestContext,
};
use http::Response;

use crate::metrics::AgentMetrics;

/// Metrics endpoint API
#[dropshot::api_description]
pub trait MetricsApi {
    type Context: Send + Sync + 'static;

    /// Agent metrics in Prometheus text format
    #[endpoint {
        method = GET,
        path = "/metrics",
        tags = ["metrics"],
    }]
    async fn get_metrics(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError>;
}

pub enum MetricsApiImpl {}

impl MetricsApi for MetricsApiImpl {
    type Context = Arc<AgentMetrics>;

    async fn get_metrics(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError> {
        let body = rqctx.context().gather();

        Response::builder()
            .status(200)
            .header(http::header::CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(body.into())
            .map_err(|e| {
                HttpError::for_internal_error(format!("failed to build response: {}", e))
            })
    }
}

/// Start serving metrics on `addr`. The returned server runs until dropped
/// or closed.
pub fn start(
    addr: SocketAddr,
    metrics: Arc<AgentMetrics>,
) -> anyhow::Result<HttpServer<Arc<AgentMetrics>>> {
    let api = metrics_api_mod::api_description::<MetricsApiImpl>()
        .map_err(|e| anyhow::anyhow!("Failed to create API description: {}", e))?;

    let config_dropshot = ConfigDropshot {
        bind_address: addr,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
        ..Default::default()
    };

    let config_logging = ConfigLogging::StderrTerminal {
        level: ConfigLoggingLevel::Warn,
    };

    let log = config_logging
        .to_logger("scrape-relay-agent-metrics")
        .map_err(|error| anyhow::anyhow!("failed to create logger: {}", error))?;

    let server = HttpServerStarter::new(&config_dropshot, api, metrics, &log)
        .map_err(|error| anyhow::anyhow!("failed to create server: {}", error))?
        .start();

    tracing::info!(address = %server.local_addr(), "Metrics endpoint listening");

    Ok(server)
}
