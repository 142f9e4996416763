// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Case Workflow Instance Domain Model
//!
//! Runtime state of one case moving through a locked template version: the
//! instance record (pointer + version lock), one derived progress row per
//! step, and the append-only override audit records.
//!
//! Progress rows are caches recomputed by the derivation engine; nothing
//! outside `sync`/`apply_override` may hand-set them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::workflow::{
    ActorId, CaseId, InstanceId, OverrideCategory, StepKey, StepStatus, TemplateId,
};

/// One case bound to one template version, permanently
///
/// # Invariants
/// - `case_id` is unique across instances
/// - `locked_template_version` never changes after creation
/// - `current_step_key` only moves forward except via explicit override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWorkflowInstance {
    pub id: InstanceId,
    pub case_id: CaseId,
    pub template_id: TemplateId,
    pub locked_template_version: i32,
    pub current_step_key: StepKey,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Compare-and-swap guard incremented on every committed mutation.
    /// Concurrent writers that lose the race get a retryable conflict.
    pub row_version: i64,
}

impl CaseWorkflowInstance {
    pub fn new(
        case_id: CaseId,
        template_id: TemplateId,
        locked_template_version: i32,
        first_step: StepKey,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InstanceId::new(),
            case_id,
            template_id,
            locked_template_version,
            current_step_key: first_step,
            started_at: now,
            completed_at: None,
            row_version: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Derived status of one step for one case
///
/// One row per (instance, step) pair, created eagerly at initialization for
/// every step in the locked template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWorkflowProgress {
    pub instance_id: InstanceId,
    pub step_key: StepKey,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
}

impl CaseWorkflowProgress {
    pub fn pending(instance_id: InstanceId, step_key: StepKey) -> Self {
        Self {
            instance_id,
            step_key,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            block_reason: None,
        }
    }

    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::Active;
        self.started_at.get_or_insert(now);
    }

    /// Days this step has been open, against `now`
    pub fn days_in_step(&self, now: DateTime<Utc>) -> i64 {
        match self.started_at {
            Some(started) => (now - started).num_days().max(0),
            None => 0,
        }
    }
}

/// Append-only audit record of one manual jump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOverride {
    pub case_id: CaseId,
    pub instance_id: InstanceId,
    pub from_step_key: StepKey,
    pub to_step_key: StepKey,
    pub reason_category: OverrideCategory,
    pub reason: String,
    pub actor_id: ActorId,
    pub created_at: DateTime<Utc>,
}
