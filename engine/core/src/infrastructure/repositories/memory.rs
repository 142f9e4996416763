// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! In-memory repository implementations
//!
//! Thread-safe, ephemeral backends for development and testing. Per-case
//! atomicity comes from the dashmap entry lock: a `commit_case` holds the
//! case's entry exclusively while it validates the `row_version`
//! compare-and-swap and applies the mutation, so two concurrent writers on
//! one case cannot interleave. Cross-case operations only contend on the
//! map shard, never on each other's state.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::domain::events::AuditEntry;
use crate::domain::evidence::EvidenceSource;
use crate::domain::instance::{CaseWorkflowInstance, CaseWorkflowProgress, WorkflowOverride};
use crate::domain::repository::{
    AuditSink, CaseCommit, CaseDirectory, CaseSnapshot, RepositoryError, TemplateRepository,
    WorkflowStore, MAX_OVERRIDES_PER_CASE,
};
use crate::domain::workflow::{CaseId, CaseStatus, InstanceId, TemplateDefinition, TemplateId};

// ============================================================================
// Templates
// ============================================================================

/// Template versions keyed by `(program_key, version)`
#[derive(Default)]
pub struct InMemoryTemplateRepository {
    templates: Mutex<HashMap<(String, i32), TemplateDefinition>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn save(&self, definition: &TemplateDefinition) -> Result<(), RepositoryError> {
        let mut templates = self
            .templates
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        let key = (
            definition.template.program_key.clone(),
            definition.template.version,
        );
        // Versions are immutable: the first write wins.
        templates.entry(key).or_insert_with(|| definition.clone());
        Ok(())
    }

    async fn find_latest(
        &self,
        program_key: &str,
    ) -> Result<Option<TemplateDefinition>, RepositoryError> {
        let templates = self
            .templates
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        Ok(templates
            .values()
            .filter(|d| d.template.program_key == program_key)
            .max_by_key(|d| d.template.version)
            .cloned())
    }

    async fn find_version(
        &self,
        program_key: &str,
        version: i32,
    ) -> Result<Option<TemplateDefinition>, RepositoryError> {
        let templates = self
            .templates
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        Ok(templates.get(&(program_key.to_string(), version)).cloned())
    }

    async fn find_by_id(
        &self,
        id: TemplateId,
    ) -> Result<Option<TemplateDefinition>, RepositoryError> {
        let templates = self
            .templates
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        Ok(templates.values().find(|d| d.template.id == id).cloned())
    }
}

// ============================================================================
// Evidence + Audit
// ============================================================================

/// Shared in-memory stand-in for the external audit log and document store
///
/// As in the durable backend, recorded action evidence and audit entries are
/// one collection: an entry's `action_type` is the action tag the engine
/// matches step requirements against.
#[derive(Default)]
pub struct InMemoryEvidenceLog {
    entries: Mutex<Vec<AuditEntry>>,
    documents: Mutex<HashMap<CaseId, BTreeSet<String>>>,
}

impl InMemoryEvidenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an action tag for a case (collaborator write surface)
    pub fn record_action(&self, case_id: CaseId, tag: impl Into<String>) {
        let entry = AuditEntry {
            case_id,
            actor_id: None,
            action_type: tag.into(),
            reason_code: "recorded_action".to_string(),
            before: serde_json::Value::Null,
            after: serde_json::Value::Null,
            created_at: chrono::Utc::now(),
        };
        self.entries.lock().expect("mutex poisoned").push(entry);
    }

    /// Record an uploaded document type for a case
    pub fn record_document(&self, case_id: CaseId, doc_type: impl Into<String>) {
        self.documents
            .lock()
            .expect("mutex poisoned")
            .entry(case_id)
            .or_default()
            .insert(doc_type.into());
    }

    /// Snapshot of all audit entries (test inspection)
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("mutex poisoned").clone()
    }

    fn append_entry(&self, entry: AuditEntry) {
        self.entries.lock().expect("mutex poisoned").push(entry);
    }
}

#[async_trait]
impl EvidenceSource for InMemoryEvidenceLog {
    async fn list_action_tags(
        &self,
        case_id: CaseId,
    ) -> Result<BTreeSet<String>, RepositoryError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        Ok(entries
            .iter()
            .filter(|e| e.case_id == case_id)
            .map(|e| e.action_type.clone())
            .collect())
    }

    async fn list_document_types(
        &self,
        case_id: CaseId,
    ) -> Result<BTreeSet<String>, RepositoryError> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        Ok(documents.get(&case_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AuditSink for InMemoryEvidenceLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.append_entry(entry);
        Ok(())
    }
}

// ============================================================================
// Workflow Store
// ============================================================================

struct CaseRecord {
    instance: CaseWorkflowInstance,
    progress: Vec<CaseWorkflowProgress>,
    overrides: Vec<WorkflowOverride>,
}

/// Per-case workflow state behind dashmap entry locks
pub struct InMemoryWorkflowStore {
    cases: DashMap<CaseId, CaseRecord>,
    audit: Arc<InMemoryEvidenceLog>,
}

impl InMemoryWorkflowStore {
    /// Audit entries committed with case mutations land in `audit`, the same
    /// log the evidence reads come from.
    pub fn new(audit: Arc<InMemoryEvidenceLog>) -> Self {
        Self {
            cases: DashMap::new(),
            audit,
        }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_case(
        &self,
        instance: &CaseWorkflowInstance,
        progress: &[CaseWorkflowProgress],
    ) -> Result<bool, RepositoryError> {
        match self.cases.entry(instance.case_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(CaseRecord {
                    instance: instance.clone(),
                    progress: progress.to_vec(),
                    overrides: Vec::new(),
                });
                Ok(true)
            }
        }
    }

    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseSnapshot>, RepositoryError> {
        Ok(self.cases.get(&case_id).map(|record| CaseSnapshot {
            instance: record.instance.clone(),
            progress: record.progress.clone(),
            override_count: record.overrides.len(),
        }))
    }

    async fn commit_case(&self, commit: CaseCommit) -> Result<(), RepositoryError> {
        let case_id = commit.instance.case_id;
        let mut record = self
            .cases
            .get_mut(&case_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("No instance for case {case_id}")))?;

        if record.instance.row_version != commit.instance.row_version {
            return Err(RepositoryError::Conflict(format!(
                "case {case_id} row_version moved from {} to {}",
                commit.instance.row_version, record.instance.row_version
            )));
        }
        if commit.new_override.is_some() && record.overrides.len() >= MAX_OVERRIDES_PER_CASE {
            return Err(RepositoryError::GovernanceLimit(format!(
                "case {case_id} already has {} overrides",
                record.overrides.len()
            )));
        }

        let mut instance = commit.instance;
        instance.row_version += 1;
        record.instance = instance;

        for row in commit.progress {
            match record
                .progress
                .iter_mut()
                .find(|existing| existing.step_key == row.step_key)
            {
                Some(existing) => *existing = row,
                None => record.progress.push(row),
            }
        }
        if let Some(record_override) = commit.new_override {
            record.overrides.push(record_override);
        }
        for entry in commit.audit {
            self.audit.append_entry(entry);
        }
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<CaseWorkflowInstance>, RepositoryError> {
        Ok(self
            .cases
            .iter()
            .map(|record| record.instance.clone())
            .collect())
    }

    async fn list_progress(
        &self,
        instance_id: InstanceId,
    ) -> Result<Vec<CaseWorkflowProgress>, RepositoryError> {
        Ok(self
            .cases
            .iter()
            .find(|record| record.instance.id == instance_id)
            .map(|record| record.progress.clone())
            .unwrap_or_default())
    }

    async fn list_overrides(&self) -> Result<Vec<WorkflowOverride>, RepositoryError> {
        Ok(self
            .cases
            .iter()
            .flat_map(|record| record.overrides.clone())
            .collect())
    }

    async fn count_overrides(&self, case_id: CaseId) -> Result<usize, RepositoryError> {
        Ok(self
            .cases
            .get(&case_id)
            .map(|record| record.overrides.len())
            .unwrap_or(0))
    }
}

// ============================================================================
// Case Directory
// ============================================================================

/// In-memory stand-in for the external case entity
#[derive(Default)]
pub struct InMemoryCaseDirectory {
    statuses: Mutex<HashMap<CaseId, CaseStatus>>,
}

impl InMemoryCaseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a case as known (tests and demos)
    pub fn register(&self, case_id: CaseId) {
        self.statuses
            .lock()
            .expect("mutex poisoned")
            .entry(case_id)
            .or_insert(CaseStatus::UnderReview);
    }

    /// Current status of a case, if known
    pub fn status(&self, case_id: CaseId) -> Option<CaseStatus> {
        self.statuses
            .lock()
            .expect("mutex poisoned")
            .get(&case_id)
            .copied()
    }
}

#[async_trait]
impl CaseDirectory for InMemoryCaseDirectory {
    async fn exists(&self, case_id: CaseId) -> Result<bool, RepositoryError> {
        let statuses = self
            .statuses
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        Ok(statuses.contains_key(&case_id))
    }

    async fn set_status(&self, case_id: CaseId, status: CaseStatus) -> Result<(), RepositoryError> {
        let mut statuses = self
            .statuses
            .lock()
            .map_err(|_| RepositoryError::Database("Mutex poisoned".to_string()))?;
        match statuses.get_mut(&case_id) {
            Some(existing) => {
                *existing = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Case {case_id} not found"))),
        }
    }
}
