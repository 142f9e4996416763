// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Startup-Time Template Seeding
//!
//! Templates are seeded explicitly at process startup (idempotent upsert),
//! never lazily inside request handlers, so concurrent first requests cannot
//! race template creation. The default foreclosure-stabilization template
//! ships as an embedded YAML manifest.

use tracing::{debug, info};

use crate::domain::repository::{RepositoryError, TemplateRepository};
use crate::domain::workflow::TemplateDefinition;
use crate::infrastructure::template_manifest::{ManifestError, TemplateManifestParser};

/// The shipped foreclosure-stabilization template manifest
pub const DEFAULT_TEMPLATE_MANIFEST: &str =
    include_str!("../../manifests/foreclosure_stabilization.yaml");

/// Seed the default foreclosure-stabilization template
pub async fn seed_default_template(
    templates: &dyn TemplateRepository,
) -> Result<TemplateDefinition, SeedError> {
    seed_from_yaml(templates, DEFAULT_TEMPLATE_MANIFEST).await
}

/// Parse a manifest and upsert it as a template version
///
/// Idempotent: when the `(program_key, version)` pair already exists, the
/// stored definition is returned untouched - a template version is immutable
/// once any case may have locked to it.
pub async fn seed_from_yaml(
    templates: &dyn TemplateRepository,
    yaml: &str,
) -> Result<TemplateDefinition, SeedError> {
    let parsed = TemplateManifestParser::parse_str(yaml)?;

    if let Some(existing) = templates
        .find_version(&parsed.template.program_key, parsed.template.version)
        .await?
    {
        debug!(
            program_key = %existing.template.program_key,
            version = existing.template.version,
            "Template version already seeded"
        );
        return Ok(existing);
    }

    templates.save(&parsed).await?;
    info!(
        program_key = %parsed.template.program_key,
        version = parsed.template.version,
        steps = parsed.steps().len(),
        "Seeded workflow template"
    );
    Ok(parsed)
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
