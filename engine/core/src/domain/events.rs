// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Workflow domain events and the audit record shape.
//!
//! Events are published on the in-process event bus after a mutation
//! commits; the audit entries are written through the [`AuditSink`] port as
//! part of the same transaction as the mutation they describe.
//!
//! [`AuditSink`]: crate::domain::repository::AuditSink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::workflow::{ActorId, CaseId, CaseStatus, OverrideCategory, StepKey};

/// Domain events emitted by the workflow engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StepCompleted {
        case_id: CaseId,
        step_key: StepKey,
        completed_at: DateTime<Utc>,
    },
    StepActivated {
        case_id: CaseId,
        step_key: StepKey,
        activated_at: DateTime<Utc>,
    },
    StepBlocked {
        case_id: CaseId,
        step_key: StepKey,
        block_reason: String,
        blocked_at: DateTime<Utc>,
    },
    InstanceCompleted {
        case_id: CaseId,
        completed_at: DateTime<Utc>,
    },
    OverrideApplied {
        case_id: CaseId,
        from_step_key: StepKey,
        to_step_key: StepKey,
        actor_id: ActorId,
        reason_category: OverrideCategory,
        applied_at: DateTime<Utc>,
    },
    CaseStatusChanged {
        case_id: CaseId,
        status: CaseStatus,
        changed_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn case_id(&self) -> CaseId {
        match self {
            Self::StepCompleted { case_id, .. }
            | Self::StepActivated { case_id, .. }
            | Self::StepBlocked { case_id, .. }
            | Self::InstanceCompleted { case_id, .. }
            | Self::OverrideApplied { case_id, .. }
            | Self::CaseStatusChanged { case_id, .. } => *case_id,
        }
    }
}

/// One append-only audit record
///
/// `action_type` doubles as a recorded-action evidence tag: collaborators
/// that list a case's action tags read them from the same log this sink
/// appends to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub case_id: CaseId,
    pub actor_id: Option<ActorId>,
    pub action_type: String,
    pub reason_code: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Audit record for a manual override
    pub fn for_override(
        case_id: CaseId,
        actor_id: ActorId,
        from_step_key: &StepKey,
        to_step_key: &StepKey,
        reason: &str,
        reason_category: OverrideCategory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id,
            actor_id: Some(actor_id),
            action_type: "workflow_override".to_string(),
            reason_code: "manual_override".to_string(),
            before: serde_json::json!({ "from_step": from_step_key }),
            after: serde_json::json!({
                "to_step": to_step_key,
                "reason": reason,
                "reason_category": reason_category.as_str(),
            }),
            created_at: now,
        }
    }

    /// Audit record for a milestone-driven case status transition
    pub fn for_status_change(
        case_id: CaseId,
        step_key: &StepKey,
        status: CaseStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id,
            actor_id: None,
            action_type: "case_status_changed".to_string(),
            reason_code: "workflow_milestone".to_string(),
            before: serde_json::json!({ "step_key": step_key }),
            after: serde_json::json!({ "status": status.as_str() }),
            created_at: now,
        }
    }
}
