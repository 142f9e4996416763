// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! # Domain Repository Interfaces
//!
//! Persistence contracts for the workflow engine, following the DDD
//! Repository pattern: interfaces defined in the domain layer, implemented
//! in `crate::infrastructure::repositories`.
//!
//! | Trait | Concern | Implementations |
//! |-------|---------|-----------------|
//! | `TemplateRepository` | immutable template versions | `InMemoryTemplateRepository`, `PostgresTemplateRepository` |
//! | `WorkflowStore` | per-case instance/progress/override state | `InMemoryWorkflowStore`, `PostgresWorkflowStore` |
//! | `CaseDirectory` | external case entity (existence + status) | `InMemoryCaseDirectory`, `PostgresCaseDirectory` |
//! | `AuditSink` | append-only audit log (collaborator-facing) | `InMemoryEvidenceLog`, `PostgresAuditSink` |
//!
//! ## Transaction discipline
//!
//! All case mutation flows through [`WorkflowStore::commit_case`], which
//! applies the instance pointer, changed progress rows, optional override
//! row, and audit entries atomically, guarded by a compare-and-swap on the
//! instance's `row_version`. A lost race surfaces as
//! [`RepositoryError::Conflict`] and is retryable. Cross-case operations
//! never coordinate; there is no global lock.

use async_trait::async_trait;

use crate::domain::events::AuditEntry;
use crate::domain::instance::{CaseWorkflowInstance, CaseWorkflowProgress, WorkflowOverride};
use crate::domain::workflow::{CaseId, CaseStatus, InstanceId, TemplateDefinition, TemplateId};

/// Hard per-case ceiling on manual overrides, enforced in the engine and
/// again inside every store's commit path.
pub const MAX_OVERRIDES_PER_CASE: usize = 3;

/// Repository interface for immutable template versions
///
/// New versions are appended; a saved version is never edited in place.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Save a template version (no-op if this program_key+version exists)
    async fn save(&self, definition: &TemplateDefinition) -> Result<(), RepositoryError>;

    /// Find the highest version for a program key
    async fn find_latest(
        &self,
        program_key: &str,
    ) -> Result<Option<TemplateDefinition>, RepositoryError>;

    /// Find one specific version of a program's template
    async fn find_version(
        &self,
        program_key: &str,
        version: i32,
    ) -> Result<Option<TemplateDefinition>, RepositoryError>;

    /// Find a template version by its row id
    async fn find_by_id(&self, id: TemplateId) -> Result<Option<TemplateDefinition>, RepositoryError>;
}

/// Consistent read of one case's workflow state
#[derive(Debug, Clone)]
pub struct CaseSnapshot {
    pub instance: CaseWorkflowInstance,
    pub progress: Vec<CaseWorkflowProgress>,
    pub override_count: usize,
}

/// Atomic write-back of one case mutation
///
/// `instance.row_version` carries the value read in the snapshot; the store
/// rejects the commit with [`RepositoryError::Conflict`] if the stored row
/// has moved on, and increments it otherwise.
#[derive(Debug, Clone)]
pub struct CaseCommit {
    pub instance: CaseWorkflowInstance,
    /// Only the rows the derivation actually changed
    pub progress: Vec<CaseWorkflowProgress>,
    pub new_override: Option<WorkflowOverride>,
    /// Audit entries written in the same transaction as the mutation
    pub audit: Vec<AuditEntry>,
}

/// Repository interface for per-case workflow state
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Create an instance with its eager progress rows
    ///
    /// Returns `false` without mutating anything when an instance already
    /// exists for the case (`case_id` is unique); concurrent initializers
    /// therefore converge on one instance.
    async fn create_case(
        &self,
        instance: &CaseWorkflowInstance,
        progress: &[CaseWorkflowProgress],
    ) -> Result<bool, RepositoryError>;

    /// Load one case's instance, progress rows, and override count
    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseSnapshot>, RepositoryError>;

    /// Apply one case mutation atomically (CAS on `row_version`)
    ///
    /// Implementations re-check the override cap before appending an
    /// override row, independent of the engine's own check.
    async fn commit_case(&self, commit: CaseCommit) -> Result<(), RepositoryError>;

    /// All instances (read-side projections)
    async fn list_instances(&self) -> Result<Vec<CaseWorkflowInstance>, RepositoryError>;

    /// Progress rows for one instance
    async fn list_progress(
        &self,
        instance_id: InstanceId,
    ) -> Result<Vec<CaseWorkflowProgress>, RepositoryError>;

    /// All override records (governance analytics)
    async fn list_overrides(&self) -> Result<Vec<WorkflowOverride>, RepositoryError>;

    /// Override count for one case
    async fn count_overrides(&self, case_id: CaseId) -> Result<usize, RepositoryError>;
}

/// Port to the external case entity
#[async_trait]
pub trait CaseDirectory: Send + Sync {
    async fn exists(&self, case_id: CaseId) -> Result<bool, RepositoryError>;

    /// Milestone side effect: update the case's business status
    async fn set_status(&self, case_id: CaseId, status: CaseStatus) -> Result<(), RepositoryError>;
}

/// Collaborator-facing append-only audit log
///
/// The engine's own audit entries ride [`WorkflowStore::commit_case`] for
/// atomicity; this port is how surrounding subsystems (ingestion, document
/// upload, action recording) append theirs.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Concurrent mutation: {0}")]
    Conflict(String),

    #[error("Governance limit: {0}")]
    GovernanceLimit(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
