// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Backend assembly: wire the engine to PostgreSQL or the in-memory stack.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use caseflow_core::application::workflow_engine::WorkflowEngine;
use caseflow_core::domain::repository::TemplateRepository;
use caseflow_core::infrastructure::db::Database;
use caseflow_core::infrastructure::event_bus::EventBus;
use caseflow_core::infrastructure::repositories::{
    InMemoryCaseDirectory, InMemoryEvidenceLog, InMemoryTemplateRepository, InMemoryWorkflowStore,
    PostgresCaseDirectory, PostgresEvidenceSource, PostgresTemplateRepository,
    PostgresWorkflowStore,
};

pub struct Runtime {
    pub engine: Arc<WorkflowEngine>,
    /// Seeding handle to the same template store the engine reads
    pub templates: Arc<dyn TemplateRepository>,
    pub event_bus: EventBus,
}

/// Build the engine over the configured storage backend
pub async fn build(database_url: Option<&str>) -> Result<Runtime> {
    let event_bus = EventBus::with_default_capacity();

    let (engine, templates) = match database_url {
        Some(url) => {
            let db = Database::new(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            sqlx::migrate!("./migrations")
                .run(db.get_pool())
                .await
                .context("Failed to run database migrations")?;
            info!("Using PostgreSQL backend");

            let pool = db.get_pool().clone();
            let templates: Arc<dyn TemplateRepository> =
                Arc::new(PostgresTemplateRepository::new(pool.clone()));
            let engine = WorkflowEngine::new(
                templates.clone(),
                Arc::new(PostgresWorkflowStore::new(pool.clone())),
                Arc::new(PostgresEvidenceSource::new(pool.clone())),
                Arc::new(PostgresCaseDirectory::new(pool)),
                event_bus.clone(),
            );
            (engine, templates)
        }
        None => {
            warn!("DATABASE_URL not set, using ephemeral in-memory backend");
            let evidence = Arc::new(InMemoryEvidenceLog::new());
            let templates: Arc<dyn TemplateRepository> =
                Arc::new(InMemoryTemplateRepository::new());
            let engine = WorkflowEngine::new(
                templates.clone(),
                Arc::new(InMemoryWorkflowStore::new(evidence.clone())),
                evidence,
                Arc::new(InMemoryCaseDirectory::new()),
                event_bus.clone(),
            );
            (engine, templates)
        }
    };

    Ok(Runtime {
        engine: Arc::new(engine),
        templates,
        event_bus,
    })
}
