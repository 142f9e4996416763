// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! # Caseflow CLI
//!
//! The `caseflow` binary serves the case-workflow HTTP API and offers
//! read-side reports from the terminal.
//!
//! ## Commands
//!
//! - `caseflow serve` - seed templates, then serve the HTTP API
//! - `caseflow seed [--manifest FILE]` - idempotently seed workflow templates
//! - `caseflow board` - print the Kanban board projection
//! - `caseflow analytics [--sla-days N]` - print portfolio metrics
//!
//! ## Storage selection
//!
//! With `DATABASE_URL` set (flag, environment, or `.env`), the PostgreSQL
//! backend is used and migrations run at startup. Without it, an ephemeral
//! in-memory backend serves development and demos.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod runtime;

/// Caseflow - case-management workflow backend
#[derive(Parser)]
#[command(name = "caseflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection string (omit for the in-memory backend)
    #[arg(long, global = true, env = "DATABASE_URL", value_name = "URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CASEFLOW_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// HTTP API host
        #[arg(long, env = "CASEFLOW_HOST", default_value = "127.0.0.1")]
        host: String,

        /// HTTP API port
        #[arg(long, env = "CASEFLOW_PORT", default_value = "8000")]
        port: u16,

        /// Prometheus metrics listener port
        #[arg(long, env = "CASEFLOW_METRICS_PORT", default_value = "9100")]
        metrics_port: u16,
    },

    /// Seed workflow templates (idempotent)
    Seed {
        /// Template manifest YAML file (defaults to the shipped template)
        #[arg(long, value_name = "FILE")]
        manifest: Option<PathBuf>,
    },

    /// Print the Kanban board projection
    Board,

    /// Print portfolio analytics
    Analytics {
        /// Fallback SLA for steps outside the latest template
        #[arg(long, default_value = "30")]
        sla_days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to build log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = runtime::build(cli.database_url.as_deref()).await?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            metrics_port,
        } => commands::serve::run(runtime, &host, port, metrics_port).await,
        Commands::Seed { manifest } => commands::seed::run(runtime, manifest.as_deref()).await,
        Commands::Board => commands::report::board(runtime).await,
        Commands::Analytics { sla_days } => commands::report::analytics(runtime, sla_days).await,
    }
}
