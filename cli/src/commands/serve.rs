// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! `caseflow serve` - seed templates, then serve the HTTP API.

use anyhow::{Context, Result};
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use caseflow_core::application::seed::seed_default_template;
use caseflow_core::infrastructure::event_bus::EventBusError;
use caseflow_core::presentation::api;

use crate::runtime::Runtime;

pub async fn run(runtime: Runtime, host: &str, port: u16, metrics_port: u16) -> Result<()> {
    // Explicit startup-time seeding; request handlers never create templates.
    let definition = seed_default_template(runtime.templates.as_ref())
        .await
        .context("Failed to seed default workflow template")?;
    info!(
        program_key = %definition.template.program_key,
        version = definition.template.version,
        "Workflow template ready"
    );

    let metrics_addr = SocketAddr::from(([127, 0, 0, 1], metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    // Tap the event bus into the log stream.
    let mut receiver = runtime.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => debug!(?event, "workflow event"),
                Err(EventBusError::Closed) => break,
                Err(_) => continue,
            }
        }
    });

    let app = api::app(runtime.engine.clone()).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;

    println!(
        "{} http://{host}:{port} (metrics on {metrics_addr})",
        "Caseflow API listening on".green().bold()
    );
    axum::serve(listener, app).await.context("Server error")
}
