// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! State Derivation Engine (pure core)
//!
//! Recomputes per-step status and the instance pointer purely from
//! `(template steps, evidence, existing progress rows)`. The functions here
//! are deterministic, side-effect free, and safe to call repeatedly: calling
//! [`advance`] twice with unchanged evidence yields identical rows, and
//! accumulated evidence only ever moves the walk forward.
//!
//! The application-layer `WorkflowEngine` owns persistence, locking, and
//! audit; this module owns the semantics. Treat progress rows as a
//! materialized view over the append-only evidence log.
//!
//! # Walk Rules
//!
//! Steps are visited in `order_index` ascending order, skipping rows already
//! complete. For the first non-complete step:
//!
//! - All required documents present, all required actions present, and no
//!   blocking condition firing → the step completes, the next step
//!   activates, and the pointer advances. The walk continues into the next
//!   step only when the completed step has `auto_advance` set.
//! - Anything missing → the step is `blocked` (block reason set) and the
//!   walk stops. Block-reason priority: first missing document, then first
//!   missing action, then the first firing blocking condition.
//! - No next step → the instance is complete.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::evidence::{ConditionRegistry, EvidenceSet};
use crate::domain::instance::CaseWorkflowProgress;
use crate::domain::workflow::{StepKey, StepStatus, WorkflowStep};

// ============================================================================
// Step Evaluation
// ============================================================================

/// Result of comparing one step's requirements against the evidence set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEvaluation {
    pub missing_documents: Vec<String>,
    pub missing_actions: Vec<String>,
    pub block_reason: Option<String>,
}

impl StepEvaluation {
    /// Nothing missing and no blocking condition firing
    pub fn is_satisfied(&self) -> bool {
        self.missing_documents.is_empty()
            && self.missing_actions.is_empty()
            && self.block_reason.is_none()
    }
}

/// Evaluate one step's requirements against the evidence set
///
/// The block reason names the first missing item in priority order:
/// documents, then actions, then blocking conditions.
pub fn evaluate_step(
    step: &WorkflowStep,
    evidence: &EvidenceSet,
    registry: &ConditionRegistry,
) -> StepEvaluation {
    let missing_documents: Vec<String> = step
        .required_documents
        .iter()
        .filter(|doc| !evidence.has_document(doc))
        .cloned()
        .collect();
    let missing_actions: Vec<String> = step
        .required_actions
        .iter()
        .filter(|action| !evidence.has_action(action))
        .cloned()
        .collect();

    let mut block_reason = registry.evaluate(&step.blocking_conditions, evidence);
    if let Some(doc) = missing_documents.first() {
        block_reason = Some(format!("missing_document: {doc}"));
    } else if let Some(action) = missing_actions.first() {
        block_reason = Some(format!("missing_action: {action}"));
    }

    StepEvaluation {
        missing_documents,
        missing_actions,
        block_reason,
    }
}

// ============================================================================
// Forward Walk
// ============================================================================

/// Net effect of one derivation pass over a case's progress rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Where the pointer lands after the walk
    pub current_step_key: StepKey,
    /// Every step of the template is complete
    pub instance_completed: bool,
    /// Steps completed during this pass, in walk order
    pub newly_completed: Vec<StepKey>,
    /// Steps activated during this pass, in walk order
    pub newly_activated: Vec<StepKey>,
    /// Whether any row or the pointer changed (false → nothing to persist)
    pub changed: bool,
}

/// Set an open step's status and block reason from its evaluation
///
/// Never completes the row. Returns whether anything changed.
fn settle_open_step(
    row: &mut CaseWorkflowProgress,
    evaluation: &StepEvaluation,
    now: DateTime<Utc>,
) -> bool {
    let mut changed = false;
    let desired = if evaluation.block_reason.is_some() {
        StepStatus::Blocked
    } else {
        StepStatus::Active
    };
    if row.status != desired {
        row.status = desired;
        changed = true;
    }
    if row.block_reason != evaluation.block_reason {
        row.block_reason = evaluation.block_reason.clone();
        changed = true;
    }
    if row.started_at.is_none() {
        row.started_at = Some(now);
        changed = true;
    }
    changed
}

/// Recompute progress rows and the pointer from accumulated evidence
///
/// Mutates `progress` in place and reports what changed. Rows never move
/// backward; completed rows are skipped untouched. The step the walk stops
/// on is always left evaluated (blocked or active, block reason current),
/// so a repeat call with unchanged evidence is a no-op.
pub fn advance(
    steps: &[WorkflowStep],
    progress: &mut BTreeMap<StepKey, CaseWorkflowProgress>,
    evidence: &EvidenceSet,
    registry: &ConditionRegistry,
    current_step_key: &StepKey,
    now: DateTime<Utc>,
) -> Result<WalkOutcome, DerivationError> {
    let mut outcome = WalkOutcome {
        current_step_key: current_step_key.clone(),
        instance_completed: false,
        newly_completed: Vec::new(),
        newly_activated: Vec::new(),
        changed: false,
    };

    for (i, step) in steps.iter().enumerate() {
        let status = progress
            .get(&step.step_key)
            .ok_or_else(|| DerivationError::MissingProgressRow(step.step_key.clone()))?
            .status;
        if status == StepStatus::Complete {
            continue;
        }

        let evaluation = evaluate_step(step, evidence, registry);
        if evaluation.is_satisfied() {
            let row = progress
                .get_mut(&step.step_key)
                .expect("checked above");
            row.status = StepStatus::Complete;
            row.block_reason = None;
            row.completed_at.get_or_insert(now);
            outcome.newly_completed.push(step.step_key.clone());
            outcome.changed = true;

            match steps.get(i + 1) {
                Some(next_step) => {
                    let next_row = progress
                        .get_mut(&next_step.step_key)
                        .ok_or_else(|| {
                            DerivationError::MissingProgressRow(next_step.step_key.clone())
                        })?;
                    if next_row.status == StepStatus::Pending {
                        next_row.activate(now);
                        outcome.newly_activated.push(next_step.step_key.clone());
                    }
                    outcome.current_step_key = next_step.step_key.clone();
                    if !step.auto_advance {
                        // Leave the freshly activated step evaluated but not
                        // completed; the next sync may complete it.
                        let next_evaluation = evaluate_step(next_step, evidence, registry);
                        if settle_open_step(next_row, &next_evaluation, now) {
                            outcome.changed = true;
                        }
                        break;
                    }
                }
                None => {
                    outcome.current_step_key = step.step_key.clone();
                    outcome.instance_completed = true;
                    break;
                }
            }
        } else {
            let row = progress
                .get_mut(&step.step_key)
                .expect("checked above");
            if settle_open_step(row, &evaluation, now) {
                outcome.changed = true;
            }
            outcome.current_step_key = step.step_key.clone();
            break;
        }
    }

    if outcome.current_step_key != *current_step_key {
        outcome.changed = true;
    }

    Ok(outcome)
}

// ============================================================================
// Override Reshape
// ============================================================================

/// Force the progress rows into the shape demanded by a manual override
///
/// Every step strictly before the target is forced complete (timestamps
/// back-filled, block reason cleared), the target becomes active with any
/// prior completion cleared, and every later step resets to pending with
/// cleared timestamps. The caller has already validated the target against
/// the locked step set and the override cap.
pub fn reshape_for_override(
    steps: &[WorkflowStep],
    progress: &mut BTreeMap<StepKey, CaseWorkflowProgress>,
    target: &StepKey,
    now: DateTime<Utc>,
) -> Result<(), DerivationError> {
    let target_order = steps
        .iter()
        .find(|s| &s.step_key == target)
        .map(|s| s.order_index)
        .ok_or_else(|| DerivationError::StepNotFound(target.clone()))?;

    for step in steps {
        let row = progress
            .get_mut(&step.step_key)
            .ok_or_else(|| DerivationError::MissingProgressRow(step.step_key.clone()))?;
        if step.order_index < target_order {
            row.status = StepStatus::Complete;
            row.started_at.get_or_insert(now);
            row.completed_at.get_or_insert(now);
            row.block_reason = None;
        } else if step.order_index == target_order {
            row.status = StepStatus::Active;
            row.started_at.get_or_insert(now);
            row.completed_at = None;
            row.block_reason = None;
        } else {
            row.status = StepStatus::Pending;
            row.started_at = None;
            row.completed_at = None;
            row.block_reason = None;
        }
    }

    Ok(())
}

// ============================================================================
// SLA
// ============================================================================

/// Whether an open step has dwelt past its allotted day count
pub fn sla_breached(progress: &CaseWorkflowProgress, sla_days: i64, now: DateTime<Utc>) -> bool {
    if !progress.status.is_open() {
        return false;
    }
    match progress.started_at {
        Some(started) => (now - started).num_days() > sla_days,
        None => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
    #[error("No progress row for step '{0}'")]
    MissingProgressRow(StepKey),

    #[error("Step '{0}' not found in locked template")]
    StepNotFound(StepKey),
}
