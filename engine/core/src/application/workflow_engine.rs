//! Workflow Engine Application Service
//!
//! Orchestrates the mutation entry points over the pure derivation core:
//! `initialize`, `sync`, `apply_override`, and the per-case `summary` read.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Load state, run the pure derivation, commit atomically
//! - **Dependencies:** Domain (derivation, ports), Infrastructure (event bus)
//!
//! # Mutation Discipline
//!
//! ```text
//! snapshot = store.load_case(case_id)          // instance + rows + row_version
//! steps    = templates[locked version]         // never the live version
//! evidence = evidence_source[case_id]          // append-only facts
//! outcome  = derivation::advance(...)          // pure recompute
//! store.commit_case(...)                       // CAS, all-or-nothing
//! event_bus.publish(...)                       // after commit only
//! ```
//!
//! Progress rows and the instance pointer are caches of the evidence log;
//! nothing outside this service mutates them.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::derivation::{
    self, advance, evaluate_step, reshape_for_override, DerivationError,
};
use crate::domain::events::{AuditEntry, WorkflowEvent};
use crate::domain::evidence::{ConditionRegistry, EvidenceSource};
use crate::domain::instance::{CaseWorkflowInstance, CaseWorkflowProgress, WorkflowOverride};
use crate::domain::repository::{
    CaseCommit, CaseDirectory, RepositoryError, TemplateRepository, WorkflowStore,
    MAX_OVERRIDES_PER_CASE,
};
use crate::domain::workflow::{
    ActorId, CaseId, CaseStatus, OverrideCategory, StepKey, StepStatus, TemplateDefinition,
    FORECLOSURE_PROGRAM_KEY,
};
use crate::infrastructure::event_bus::EventBus;

/// Step whose activation flips the case into its in-progress business status
const LEASEBACK_STEP_KEY: &str = "leaseback_execution";

// ============================================================================
// Application Service: WorkflowEngine
// ============================================================================

/// Workflow Engine (Application Service)
///
/// One instance serves all cases; it holds no per-case state of its own, so
/// cross-case calls are fully independent.
pub struct WorkflowEngine {
    templates: Arc<dyn TemplateRepository>,
    store: Arc<dyn WorkflowStore>,
    evidence: Arc<dyn EvidenceSource>,
    cases: Arc<dyn CaseDirectory>,
    event_bus: EventBus,
    conditions: ConditionRegistry,
    program_key: String,
    max_overrides: usize,
}

impl WorkflowEngine {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        store: Arc<dyn WorkflowStore>,
        evidence: Arc<dyn EvidenceSource>,
        cases: Arc<dyn CaseDirectory>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            templates,
            store,
            evidence,
            cases,
            event_bus,
            conditions: ConditionRegistry::with_defaults(),
            program_key: FORECLOSURE_PROGRAM_KEY.to_string(),
            max_overrides: MAX_OVERRIDES_PER_CASE,
        }
    }

    /// Serve a different program's template set
    pub fn with_program_key(mut self, program_key: impl Into<String>) -> Self {
        self.program_key = program_key.into();
        self
    }

    /// Replace the blocking-condition registry
    pub fn with_conditions(mut self, conditions: ConditionRegistry) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn program_key(&self) -> &str {
        &self.program_key
    }

    pub(crate) fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub(crate) fn templates(&self) -> &Arc<dyn TemplateRepository> {
        &self.templates
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind a case to the program's current template version
    ///
    /// Idempotent: an existing instance is returned unchanged. A fresh
    /// instance gets one progress row per step (first step active, rest
    /// pending) and is settled with one `sync`, so ingestion-created cases
    /// that already carry their creation evidence advance immediately.
    pub async fn initialize(&self, case_id: CaseId) -> Result<CaseWorkflowInstance, EngineError> {
        if !self
            .cases
            .exists(case_id)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?
        {
            return Err(EngineError::CaseNotFound(case_id));
        }

        if let Some(snapshot) = self
            .store
            .load_case(case_id)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?
        {
            return Ok(snapshot.instance);
        }

        let definition = self
            .templates
            .find_latest(&self.program_key)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?
            .ok_or_else(|| EngineError::TemplateNotFound(self.program_key.clone()))?;

        let now = Utc::now();
        let first_step = definition.first_step().step_key.clone();
        let instance = CaseWorkflowInstance::new(
            case_id,
            definition.template.id,
            definition.template.version,
            first_step.clone(),
            now,
        );
        let mut progress: Vec<CaseWorkflowProgress> = definition
            .steps()
            .iter()
            .map(|step| CaseWorkflowProgress::pending(instance.id, step.step_key.clone()))
            .collect();
        progress[0].activate(now);

        let created = self
            .store
            .create_case(&instance, &progress)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?;
        if created {
            info!(
                case_id = %case_id,
                template_id = %instance.template_id,
                template_version = instance.locked_template_version,
                "Initialized case workflow instance"
            );
            counter!("caseflow_instances_initialized_total").increment(1);
            self.event_bus.publish(WorkflowEvent::StepActivated {
                case_id,
                step_key: first_step,
                activated_at: now,
            });
        } else {
            debug!(case_id = %case_id, "Lost initialization race, reusing existing instance");
        }

        self.sync(case_id).await
    }

    // ========================================================================
    // State Derivation
    // ========================================================================

    /// Recompute the case's progress rows and pointer from evidence
    ///
    /// Idempotent and monotonic: unchanged evidence commits nothing, and
    /// accumulated evidence only ever moves the pointer forward.
    pub async fn sync(&self, case_id: CaseId) -> Result<CaseWorkflowInstance, EngineError> {
        let started = Instant::now();
        let snapshot = self
            .store
            .load_case(case_id)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?
            .ok_or(EngineError::InstanceNotFound(case_id))?;

        let definition = self.locked_definition(&snapshot.instance).await?;
        let evidence = self
            .evidence
            .evidence_for(case_id)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?;

        let before: BTreeMap<StepKey, CaseWorkflowProgress> = snapshot
            .progress
            .iter()
            .map(|row| (row.step_key.clone(), row.clone()))
            .collect();
        let mut rows = before.clone();
        let now = Utc::now();

        let outcome = advance(
            definition.steps(),
            &mut rows,
            &evidence,
            &self.conditions,
            &snapshot.instance.current_step_key,
            now,
        )?;

        counter!("caseflow_sync_total").increment(1);
        histogram!("caseflow_sync_duration_seconds").record(started.elapsed().as_secs_f64());

        if !outcome.changed {
            debug!(case_id = %case_id, step = %snapshot.instance.current_step_key, "Sync found nothing to settle");
            return Ok(snapshot.instance);
        }

        let mut instance = snapshot.instance.clone();
        let pointer_moved = instance.current_step_key != outcome.current_step_key;
        instance.current_step_key = outcome.current_step_key.clone();
        let newly_completed_instance = outcome.instance_completed && instance.completed_at.is_none();
        if newly_completed_instance {
            instance.completed_at = Some(now);
        }

        let changed_rows: Vec<CaseWorkflowProgress> = rows
            .values()
            .filter(|row| before.get(&row.step_key) != Some(*row))
            .cloned()
            .collect();

        // Milestone side effects are audited in the same transaction as the
        // rows they justify.
        let mut audit = Vec::new();
        let mut status_change: Option<CaseStatus> = None;
        if pointer_moved && instance.current_step_key.as_str() == LEASEBACK_STEP_KEY {
            status_change = Some(CaseStatus::InProgress);
        }
        if newly_completed_instance {
            status_change = Some(CaseStatus::ProgramCompletedPositiveOutcome);
        }
        if let Some(status) = status_change {
            audit.push(AuditEntry::for_status_change(
                case_id,
                &instance.current_step_key,
                status,
                now,
            ));
        }

        self.store
            .commit_case(CaseCommit {
                instance: instance.clone(),
                progress: changed_rows,
                new_override: None,
                audit,
            })
            .await
            .map_err(|e| EngineError::repo(case_id, e))?;

        if let Some(status) = status_change {
            self.cases
                .set_status(case_id, status)
                .await
                .map_err(|e| EngineError::repo(case_id, e))?;
            self.event_bus.publish(WorkflowEvent::CaseStatusChanged {
                case_id,
                status,
                changed_at: now,
            });
        }

        for step_key in &outcome.newly_completed {
            self.event_bus.publish(WorkflowEvent::StepCompleted {
                case_id,
                step_key: step_key.clone(),
                completed_at: now,
            });
        }
        for step_key in &outcome.newly_activated {
            self.event_bus.publish(WorkflowEvent::StepActivated {
                case_id,
                step_key: step_key.clone(),
                activated_at: now,
            });
        }
        if let Some(row) = rows.get(&instance.current_step_key) {
            if row.status == StepStatus::Blocked
                && before.get(&row.step_key).map(|b| b.block_reason.clone())
                    != Some(row.block_reason.clone())
            {
                if let Some(reason) = &row.block_reason {
                    self.event_bus.publish(WorkflowEvent::StepBlocked {
                        case_id,
                        step_key: row.step_key.clone(),
                        block_reason: reason.clone(),
                        blocked_at: now,
                    });
                }
            }
        }
        if newly_completed_instance {
            self.event_bus
                .publish(WorkflowEvent::InstanceCompleted { case_id, completed_at: now });
            info!(case_id = %case_id, "Case workflow completed");
        }

        info!(
            case_id = %case_id,
            step = %instance.current_step_key,
            completed = outcome.newly_completed.len(),
            "Synced case workflow"
        );
        Ok(instance)
    }

    // ========================================================================
    // Override Governor
    // ========================================================================

    /// Force the pointer to an arbitrary step of the locked template
    ///
    /// Bounded (hard per-case cap) and audited: one override row and one
    /// audit entry are written atomically with the reshaped progress rows.
    /// Rejections mutate nothing.
    pub async fn apply_override(
        &self,
        case_id: CaseId,
        to_step_key: StepKey,
        actor_id: ActorId,
        reason: String,
        reason_category: OverrideCategory,
    ) -> Result<CaseWorkflowInstance, EngineError> {
        let snapshot = self
            .store
            .load_case(case_id)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?
            .ok_or(EngineError::InstanceNotFound(case_id))?;

        if snapshot.override_count >= self.max_overrides {
            counter!("caseflow_override_total", "outcome" => "rejected_cap").increment(1);
            warn!(
                case_id = %case_id,
                count = snapshot.override_count,
                "Override rejected: per-case limit reached"
            );
            return Err(EngineError::OverrideLimitExceeded {
                case_id,
                max: self.max_overrides,
            });
        }

        let definition = self.locked_definition(&snapshot.instance).await?;
        if !definition.contains_step(&to_step_key) {
            counter!("caseflow_override_total", "outcome" => "rejected_target").increment(1);
            return Err(EngineError::InvalidOverrideTarget(to_step_key));
        }

        let mut rows: BTreeMap<StepKey, CaseWorkflowProgress> = snapshot
            .progress
            .iter()
            .map(|row| (row.step_key.clone(), row.clone()))
            .collect();
        let now = Utc::now();
        reshape_for_override(definition.steps(), &mut rows, &to_step_key, now)?;

        let mut instance = snapshot.instance.clone();
        let from_step_key = instance.current_step_key.clone();
        instance.current_step_key = to_step_key.clone();
        // The target is active again, so the instance is no longer terminal.
        instance.completed_at = None;

        let record = WorkflowOverride {
            case_id,
            instance_id: instance.id,
            from_step_key: from_step_key.clone(),
            to_step_key: to_step_key.clone(),
            reason_category,
            reason: reason.clone(),
            actor_id,
            created_at: now,
        };
        let audit = AuditEntry::for_override(
            case_id,
            actor_id,
            &from_step_key,
            &to_step_key,
            &reason,
            reason_category,
            now,
        );

        self.store
            .commit_case(CaseCommit {
                instance: instance.clone(),
                progress: rows.into_values().collect(),
                new_override: Some(record),
                audit: vec![audit],
            })
            .await
            .map_err(|e| EngineError::repo(case_id, e))?;

        counter!("caseflow_override_total", "outcome" => "applied").increment(1);
        info!(
            case_id = %case_id,
            from = %from_step_key,
            to = %to_step_key,
            actor = %actor_id,
            category = reason_category.as_str(),
            "Applied workflow override"
        );
        self.event_bus.publish(WorkflowEvent::OverrideApplied {
            case_id,
            from_step_key,
            to_step_key,
            actor_id,
            reason_category,
            applied_at: now,
        });

        Ok(instance)
    }

    // ========================================================================
    // Per-Case Summary
    // ========================================================================

    /// Sync, then report the case's full derived state
    pub async fn summary(&self, case_id: CaseId) -> Result<WorkflowSummary, EngineError> {
        let instance = self.sync(case_id).await?;
        let snapshot = self
            .store
            .load_case(case_id)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?
            .ok_or(EngineError::InstanceNotFound(case_id))?;
        let definition = self.locked_definition(&instance).await?;
        let evidence = self
            .evidence
            .evidence_for(case_id)
            .await
            .map_err(|e| EngineError::repo(case_id, e))?;
        let now = Utc::now();

        let current_step = definition.step(&instance.current_step_key);
        let (missing_documents, next_required_actions, blocking_conditions) = match current_step {
            Some(step) => {
                let evaluation = evaluate_step(step, &evidence, &self.conditions);
                (
                    evaluation.missing_documents,
                    evaluation.missing_actions,
                    step.blocking_conditions.clone(),
                )
            }
            None => (Vec::new(), Vec::new(), Vec::new()),
        };

        let rows: BTreeMap<&StepKey, &CaseWorkflowProgress> = snapshot
            .progress
            .iter()
            .map(|row| (&row.step_key, row))
            .collect();
        let timeline = definition
            .steps()
            .iter()
            .filter_map(|step| {
                rows.get(&step.step_key).map(|row| TimelineEntry {
                    step_key: step.step_key.clone(),
                    display_name: step.display_name.clone(),
                    display_column: step.display_column.clone(),
                    status: row.status,
                    started_at: row.started_at,
                    completed_at: row.completed_at,
                    block_reason: row.block_reason.clone(),
                    sla_days: step.sla_days,
                    sla_breach: derivation::sla_breached(row, step.sla_days, now),
                })
            })
            .collect();

        Ok(WorkflowSummary {
            case_id,
            current_step: instance.current_step_key.clone(),
            template_version: instance.locked_template_version,
            completed_at: instance.completed_at,
            missing_documents,
            next_required_actions,
            blocking_conditions,
            timeline,
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Resolve the step set the instance is locked to, never the live one
    pub(crate) async fn locked_definition(
        &self,
        instance: &CaseWorkflowInstance,
    ) -> Result<TemplateDefinition, EngineError> {
        let definition = self
            .templates
            .find_by_id(instance.template_id)
            .await
            .map_err(|e| EngineError::repo(instance.case_id, e))?
            .ok_or_else(|| {
                EngineError::TemplateNotFound(format!(
                    "template {} (locked v{})",
                    instance.template_id, instance.locked_template_version
                ))
            })?;

        if definition.template.version == instance.locked_template_version {
            return Ok(definition);
        }

        // Template versions are append-only, so a mismatch means the row was
        // edited out-of-band. Re-resolve by the locked version.
        warn!(
            template_id = %instance.template_id,
            stored_version = definition.template.version,
            locked_version = instance.locked_template_version,
            "Template version drift detected, re-resolving locked version"
        );
        self.templates
            .find_version(&definition.template.program_key, instance.locked_template_version)
            .await
            .map_err(|e| EngineError::repo(instance.case_id, e))?
            .ok_or_else(|| {
                EngineError::TemplateNotFound(format!(
                    "{} v{}",
                    definition.template.program_key, instance.locked_template_version
                ))
            })
    }
}

// ============================================================================
// Read Model: Per-Case Summary
// ============================================================================

/// Full derived state of one case, as returned by the workflow endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub case_id: CaseId,
    pub current_step: StepKey,
    pub template_version: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub missing_documents: Vec<String>,
    pub next_required_actions: Vec<String>,
    pub blocking_conditions: Vec<String>,
    pub timeline: Vec<TimelineEntry>,
}

/// One step of the per-case timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub step_key: StepKey,
    pub display_name: String,
    pub display_column: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub sla_days: i64,
    pub sla_breach: bool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Case {0} not found")]
    CaseNotFound(CaseId),

    #[error("No workflow instance for case {0}")]
    InstanceNotFound(CaseId),

    #[error("No workflow template available: {0}")]
    TemplateNotFound(String),

    #[error("Override target step '{0}' is not in the locked template")]
    InvalidOverrideTarget(StepKey),

    #[error("Override limit reached for case {case_id} (max {max})")]
    OverrideLimitExceeded { case_id: CaseId, max: usize },

    #[error("Concurrent mutation on case {0}, retry the operation")]
    Conflict(CaseId),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl EngineError {
    /// Map storage failures onto the engine taxonomy for one case
    fn repo(case_id: CaseId, err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => Self::Conflict(case_id),
            RepositoryError::GovernanceLimit(_) => Self::OverrideLimitExceeded {
                case_id,
                max: MAX_OVERRIDES_PER_CASE,
            },
            other => Self::Repository(other),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
