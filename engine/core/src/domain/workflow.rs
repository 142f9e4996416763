//! Workflow Template Domain Model
//!
//! This module defines the core domain entities and value objects for the
//! case-workflow engine: versioned step templates and their per-step
//! requirements.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Case Workflow Context
//! - **Aggregate Root:** TemplateDefinition (template + ordered steps)
//!
//! # Design Principles
//!
//! 1. **Immutability:** A template version is immutable once saved; new
//!    versions are appended, never edited in place
//! 2. **Derived Truth:** Templates only describe requirements; case state is
//!    recomputed from evidence, never hand-set
//! 3. **Self-Validating:** Constructors enforce invariants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// Program key of the default foreclosure-stabilization workflow.
pub const FORECLOSURE_PROGRAM_KEY: &str = "foreclosure_stabilization_v1";

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Unique identifier for a workflow template version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub Uuid);

impl TemplateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a case (owned by the surrounding case entity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub Uuid);

impl CaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a case workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the human or system actor behind an audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique key for a step within a template (e.g., "contact_homeowner")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey(String);

impl StepKey {
    /// Create a new StepKey with validation
    ///
    /// # Validation Rules
    /// - Must not be empty
    /// - Recommended: lowercase_with_underscores
    pub fn new(key: impl Into<String>) -> Result<Self, TemplateError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TemplateError::InvalidStepKey(
                "Step key cannot be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects: Enumerations
// ============================================================================

/// Party responsible for driving a step to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsibleRole {
    Operator,
    Occupant,
    System,
    Lender,
}

impl ResponsibleRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Occupant => "occupant",
            Self::System => "system",
            Self::Lender => "lender",
        }
    }
}

/// Derived status of one step for one case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Blocked,
    Complete,
}

impl StepStatus {
    /// A step counts against its SLA only while it is still open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Complete => "complete",
        }
    }
}

/// Mandatory categorization of a manual override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideCategory {
    DataCorrection,
    LegalException,
    ExecutiveDirective,
    SystemRecovery,
}

impl OverrideCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataCorrection => "data_correction",
            Self::LegalException => "legal_exception",
            Self::ExecutiveDirective => "executive_directive",
            Self::SystemRecovery => "system_recovery",
        }
    }
}

/// Business status of the surrounding case entity
///
/// The engine only ever writes `InProgress` (leaseback milestone) and
/// `ProgramCompletedPositiveOutcome` (final step complete); the rest belong
/// to intake and review flows owned by other subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    IntakeSubmitted,
    IntakeIncomplete,
    UnderReview,
    InProgress,
    ProgramCompletedPositiveOutcome,
    CaseClosedOtherOutcome,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntakeSubmitted => "intake_submitted",
            Self::IntakeIncomplete => "intake_incomplete",
            Self::UnderReview => "under_review",
            Self::InProgress => "in_progress",
            Self::ProgramCompletedPositiveOutcome => "program_completed_positive_outcome",
            Self::CaseClosedOtherOutcome => "case_closed_other_outcome",
        }
    }
}

// ============================================================================
// Entities: Template and Steps
// ============================================================================

/// One immutable version of a workflow template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub program_key: String,
    pub version: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One step in an ordered template, with its evidence requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub template_id: TemplateId,
    pub step_key: StepKey,
    pub display_name: String,
    pub responsible_role: ResponsibleRole,

    /// Document types that must have been uploaded for the case
    pub required_documents: BTreeSet<String>,

    /// Action tags that must have been recorded for the case
    pub required_actions: BTreeSet<String>,

    /// Named predicates evaluated against the evidence set, in order
    pub blocking_conditions: Vec<String>,

    /// Kanban column this step's cases are displayed under
    pub display_column: String,

    /// Position in the linear step sequence (unique within the template)
    pub order_index: i32,

    /// Whether `sync` continues into the next step in the same call
    pub auto_advance: bool,

    /// Days a case may dwell in this step before breaching its SLA
    pub sla_days: i64,
}

/// Template Aggregate Root
///
/// A template version together with its ordered steps. Immutable once any
/// case instance locks to it.
///
/// # Invariants
/// - Must have at least one step
/// - Step keys are unique within the template
/// - `order_index` values are unique and define the linear sequence
/// - Every step has `sla_days > 0`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub template: WorkflowTemplate,
    steps: Vec<WorkflowStep>,
}

impl TemplateDefinition {
    /// Create a new TemplateDefinition with validation
    ///
    /// Steps are stored sorted by `order_index` ascending.
    pub fn new(
        template: WorkflowTemplate,
        mut steps: Vec<WorkflowStep>,
    ) -> Result<Self, TemplateError> {
        if template.program_key.is_empty() {
            return Err(TemplateError::InvalidProgramKey(
                "Program key cannot be empty".to_string(),
            ));
        }
        if template.version < 1 {
            return Err(TemplateError::InvalidVersion(template.version));
        }
        if steps.is_empty() {
            return Err(TemplateError::NoSteps);
        }

        let mut seen_keys = HashSet::new();
        let mut seen_orders = HashSet::new();
        for step in &steps {
            if !seen_keys.insert(step.step_key.clone()) {
                return Err(TemplateError::DuplicateStepKey(step.step_key.clone()));
            }
            if !seen_orders.insert(step.order_index) {
                return Err(TemplateError::DuplicateOrderIndex(step.order_index));
            }
            if step.sla_days <= 0 {
                return Err(TemplateError::InvalidSlaDays {
                    step_key: step.step_key.clone(),
                    sla_days: step.sla_days,
                });
            }
        }

        steps.sort_by_key(|s| s.order_index);

        Ok(Self { template, steps })
    }

    /// Steps in `order_index` ascending order
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// The entry step of the sequence
    pub fn first_step(&self) -> &WorkflowStep {
        self.steps.first().expect("Invariant: at least one step")
    }

    /// Get a step by key
    pub fn step(&self, key: &StepKey) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| &s.step_key == key)
    }

    pub fn contains_step(&self, key: &StepKey) -> bool {
        self.step(key).is_some()
    }

    /// Display columns in step order, deduplicated
    pub fn display_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for step in &self.steps {
            if !columns.contains(&step.display_column) {
                columns.push(step.display_column.clone());
            }
        }
        columns
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template must have at least one step")]
    NoSteps,

    #[error("Duplicate step key '{0}' in template")]
    DuplicateStepKey(StepKey),

    #[error("Duplicate order index {0} in template")]
    DuplicateOrderIndex(i32),

    #[error("Step '{step_key}' has non-positive sla_days {sla_days}")]
    InvalidSlaDays { step_key: StepKey, sla_days: i64 },

    #[error("Invalid step key: {0}")]
    InvalidStepKey(String),

    #[error("Invalid program key: {0}")]
    InvalidProgramKey(String),

    #[error("Invalid template version: {0}")]
    InvalidVersion(i32),

    #[error("Step '{0}' not found in template")]
    StepNotFound(StepKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(template_id: TemplateId, key: &str, order: i32) -> WorkflowStep {
        WorkflowStep {
            template_id,
            step_key: StepKey::new(key).unwrap(),
            display_name: key.to_string(),
            responsible_role: ResponsibleRole::Operator,
            required_documents: BTreeSet::new(),
            required_actions: BTreeSet::new(),
            blocking_conditions: Vec::new(),
            display_column: "Intake".to_string(),
            order_index: order,
            auto_advance: false,
            sla_days: 7,
        }
    }

    fn template() -> WorkflowTemplate {
        WorkflowTemplate {
            id: TemplateId::new(),
            program_key: FORECLOSURE_PROGRAM_KEY.to_string(),
            version: 1,
            name: "Test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_step_key_validation() {
        assert!(StepKey::new("contact_homeowner").is_ok());
        assert!(StepKey::new("").is_err());
    }

    #[test]
    fn test_template_requires_steps() {
        let result = TemplateDefinition::new(template(), vec![]);
        assert!(matches!(result, Err(TemplateError::NoSteps)));
    }

    #[test]
    fn test_template_rejects_duplicate_step_key() {
        let t = template();
        let result =
            TemplateDefinition::new(t.clone(), vec![step(t.id, "intake", 1), step(t.id, "intake", 2)]);
        assert!(matches!(result, Err(TemplateError::DuplicateStepKey(_))));
    }

    #[test]
    fn test_template_rejects_duplicate_order_index() {
        let t = template();
        let result =
            TemplateDefinition::new(t.clone(), vec![step(t.id, "a", 1), step(t.id, "b", 1)]);
        assert!(matches!(result, Err(TemplateError::DuplicateOrderIndex(1))));
    }

    #[test]
    fn test_template_rejects_non_positive_sla() {
        let t = template();
        let mut bad = step(t.id, "a", 1);
        bad.sla_days = 0;
        let result = TemplateDefinition::new(t, vec![bad]);
        assert!(matches!(result, Err(TemplateError::InvalidSlaDays { .. })));
    }

    #[test]
    fn test_steps_sorted_by_order_index() {
        let t = template();
        let def = TemplateDefinition::new(
            t.clone(),
            vec![step(t.id, "second", 2), step(t.id, "first", 1)],
        )
        .unwrap();
        assert_eq!(def.first_step().step_key.as_str(), "first");
        assert_eq!(def.steps()[1].step_key.as_str(), "second");
    }

    #[test]
    fn test_display_columns_deduplicated_in_order() {
        let t = template();
        let mut a = step(t.id, "a", 1);
        a.display_column = "Intake".to_string();
        let mut b = step(t.id, "b", 2);
        b.display_column = "Review".to_string();
        let mut c = step(t.id, "c", 3);
        c.display_column = "Intake".to_string();
        let def = TemplateDefinition::new(t, vec![a, b, c]).unwrap();
        assert_eq!(def.display_columns(), vec!["Intake", "Review"]);
    }
}
