// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! `caseflow seed` - idempotently seed workflow templates.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;

use caseflow_core::application::seed::{seed_default_template, seed_from_yaml};

use crate::runtime::Runtime;

pub async fn run(runtime: Runtime, manifest: Option<&Path>) -> Result<()> {
    let definition = match manifest {
        Some(path) => {
            let yaml = fs::read_to_string(path)
                .with_context(|| format!("Failed to read manifest '{}'", path.display()))?;
            seed_from_yaml(runtime.templates.as_ref(), &yaml)
                .await
                .context("Failed to seed template from manifest")?
        }
        None => seed_default_template(runtime.templates.as_ref())
            .await
            .context("Failed to seed default workflow template")?,
    };

    println!(
        "{} {} v{} ({} steps)",
        "Seeded".green().bold(),
        definition.template.program_key,
        definition.template.version,
        definition.steps().len()
    );
    Ok(())
}
