// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! `caseflow board` / `caseflow analytics` - read-side reports.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::runtime::Runtime;

pub async fn board(runtime: Runtime) -> Result<()> {
    let board = runtime
        .engine
        .board()
        .await
        .context("Failed to build Kanban board")?;

    println!("{}", "Kanban board".bold());
    for column in &board.columns {
        println!("  {} ({})", column.name.cyan(), column.cases.len());
        for card in &column.cases {
            let marker = if card.blocked {
                "blocked".red().to_string()
            } else if card.sla_breach {
                "sla breach".yellow().to_string()
            } else {
                "open".normal().to_string()
            };
            println!(
                "    {}  {}  {}d  [{marker}]",
                card.case_id,
                card.current_step,
                card.days_in_stage
            );
        }
    }
    Ok(())
}

pub async fn analytics(runtime: Runtime, sla_days: i64) -> Result<()> {
    let metrics = runtime
        .engine
        .analytics(sla_days)
        .await
        .context("Failed to compute analytics")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&metrics).context("Failed to render analytics")?
    );
    Ok(())
}
