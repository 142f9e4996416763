// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the workflow engine
//!
//! These tests drive the full engine over the in-memory backend:
//! initialization, evidence-driven sync, override governance, version
//! locking, and the board/analytics projections.

use std::sync::Arc;

use caseflow_core::application::seed::{seed_default_template, seed_from_yaml};
use caseflow_core::application::workflow_engine::{EngineError, WorkflowEngine};
use caseflow_core::domain::repository::{
    CaseCommit, RepositoryError, TemplateRepository, WorkflowStore,
};
use caseflow_core::domain::workflow::{
    ActorId, CaseId, CaseStatus, OverrideCategory, StepKey, StepStatus,
};
use caseflow_core::infrastructure::event_bus::EventBus;
use caseflow_core::infrastructure::repositories::{
    InMemoryCaseDirectory, InMemoryEvidenceLog, InMemoryTemplateRepository, InMemoryWorkflowStore,
};

const TEST_PROGRAM: &str = "test_program";

const TEST_MANIFEST_V1: &str = r#"
apiVersion: caseflow.dev/v1
kind: WorkflowTemplate
metadata:
  programKey: test_program
  version: 1
  name: Test Program v1
steps:
  - stepKey: intake
    displayName: Intake
    responsibleRole: operator
    requiredActions:
      - alpha_logged
      - beta_logged
    displayColumn: Intake
    slaDays: 1
  - stepKey: review
    displayName: Review
    responsibleRole: operator
    requiredDocuments:
      - id_verification
    displayColumn: Review
    slaDays: 5
  - stepKey: closeout
    displayName: Closeout
    responsibleRole: lender
    requiredActions:
      - closed
    displayColumn: Done
    slaDays: 7
"#;

const TEST_MANIFEST_V2: &str = r#"
apiVersion: caseflow.dev/v1
kind: WorkflowTemplate
metadata:
  programKey: test_program
  version: 2
  name: Test Program v2
steps:
  - stepKey: triage
    displayName: Triage
    responsibleRole: operator
    requiredActions:
      - triaged
    displayColumn: Triage
    slaDays: 2
"#;

struct Harness {
    engine: WorkflowEngine,
    templates: Arc<InMemoryTemplateRepository>,
    store: Arc<InMemoryWorkflowStore>,
    evidence: Arc<InMemoryEvidenceLog>,
    cases: Arc<InMemoryCaseDirectory>,
    bus: EventBus,
}

fn harness(program_key: &str) -> Harness {
    let templates = Arc::new(InMemoryTemplateRepository::new());
    let evidence = Arc::new(InMemoryEvidenceLog::new());
    let store = Arc::new(InMemoryWorkflowStore::new(evidence.clone()));
    let cases = Arc::new(InMemoryCaseDirectory::new());
    let bus = EventBus::with_default_capacity();

    let engine = WorkflowEngine::new(
        templates.clone(),
        store.clone(),
        evidence.clone(),
        cases.clone(),
        bus.clone(),
    )
    .with_program_key(program_key);

    Harness {
        engine,
        templates,
        store,
        evidence,
        cases,
        bus,
    }
}

async fn test_harness() -> Harness {
    let h = harness(TEST_PROGRAM);
    seed_from_yaml(h.templates.as_ref(), TEST_MANIFEST_V1)
        .await
        .unwrap();
    h
}

fn new_case(h: &Harness) -> CaseId {
    let case_id = CaseId::new();
    h.cases.register(case_id);
    case_id
}

fn key(s: &str) -> StepKey {
    StepKey::new(s).unwrap()
}

/// Sync repeatedly until the pointer stops moving
async fn sync_until_settled(h: &Harness, case_id: CaseId) {
    let mut previous = h.engine.sync(case_id).await.unwrap().current_step_key;
    for _ in 0..16 {
        let current = h.engine.sync(case_id).await.unwrap().current_step_key;
        if current == previous {
            return;
        }
        previous = current;
    }
    panic!("sync did not settle");
}

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test]
async fn test_initialize_fresh_case_is_deterministic() {
    let h = test_harness().await;
    let case_id = new_case(&h);

    let instance = h.engine.initialize(case_id).await.unwrap();
    assert_eq!(instance.current_step_key, key("intake"));
    assert_eq!(instance.locked_template_version, 1);
    assert!(instance.completed_at.is_none());

    let snapshot = h.store.load_case(case_id).await.unwrap().unwrap();
    assert_eq!(snapshot.progress.len(), 3);
    for row in &snapshot.progress {
        if row.step_key == key("intake") {
            // Evaluated by the settling sync: blocked on the first missing action.
            assert_eq!(row.status, StepStatus::Blocked);
            assert_eq!(row.block_reason.as_deref(), Some("missing_action: alpha_logged"));
            assert!(row.started_at.is_some());
        } else {
            assert_eq!(row.status, StepStatus::Pending);
            assert!(row.started_at.is_none());
        }
    }
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let h = test_harness().await;
    let case_id = new_case(&h);

    let first = h.engine.initialize(case_id).await.unwrap();
    let second = h.engine.initialize(case_id).await.unwrap();
    assert_eq!(first.id, second.id);

    let instances = h.store.list_instances().await.unwrap();
    assert_eq!(instances.len(), 1);
}

#[tokio::test]
async fn test_initialize_unknown_case_rejected() {
    let h = test_harness().await;
    let result = h.engine.initialize(CaseId::new()).await;
    assert!(matches!(result, Err(EngineError::CaseNotFound(_))));
}

#[tokio::test]
async fn test_sync_without_instance_rejected() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    let result = h.engine.sync(case_id).await;
    assert!(matches!(result, Err(EngineError::InstanceNotFound(_))));
}

// ============================================================================
// Evidence-Driven Sync
// ============================================================================

#[tokio::test]
async fn test_evidence_driven_completion() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    // Only one of the two required actions recorded.
    h.evidence.record_action(case_id, "alpha_logged");
    let instance = h.engine.sync(case_id).await.unwrap();
    assert_eq!(instance.current_step_key, key("intake"));
    let snapshot = h.store.load_case(case_id).await.unwrap().unwrap();
    let intake = snapshot
        .progress
        .iter()
        .find(|r| r.step_key == key("intake"))
        .unwrap();
    assert_eq!(intake.status, StepStatus::Blocked);
    assert_eq!(intake.block_reason.as_deref(), Some("missing_action: beta_logged"));

    // Second action arrives: intake completes, review activates.
    h.evidence.record_action(case_id, "beta_logged");
    let instance = h.engine.sync(case_id).await.unwrap();
    assert_eq!(instance.current_step_key, key("review"));
    let snapshot = h.store.load_case(case_id).await.unwrap().unwrap();
    let intake = snapshot
        .progress
        .iter()
        .find(|r| r.step_key == key("intake"))
        .unwrap();
    assert_eq!(intake.status, StepStatus::Complete);
    assert!(intake.completed_at.is_some());
    let review = snapshot
        .progress
        .iter()
        .find(|r| r.step_key == key("review"))
        .unwrap();
    assert_eq!(review.status, StepStatus::Blocked);
    assert_eq!(
        review.block_reason.as_deref(),
        Some("missing_document: id_verification")
    );
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();
    h.evidence.record_action(case_id, "alpha_logged");
    h.evidence.record_action(case_id, "beta_logged");

    let first = h.engine.sync(case_id).await.unwrap();
    let after_first = h.store.load_case(case_id).await.unwrap().unwrap();

    let second = h.engine.sync(case_id).await.unwrap();
    let after_second = h.store.load_case(case_id).await.unwrap().unwrap();

    assert_eq!(first.current_step_key, second.current_step_key);
    assert_eq!(after_first.progress, after_second.progress);
    assert_eq!(
        after_first.instance.row_version,
        after_second.instance.row_version
    );
}

#[tokio::test]
async fn test_sync_is_monotonic() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    h.evidence.record_action(case_id, "alpha_logged");
    h.evidence.record_action(case_id, "beta_logged");
    let instance = h.engine.sync(case_id).await.unwrap();
    assert_eq!(instance.current_step_key, key("review"));

    // Nothing new: the pointer never moves backward.
    for _ in 0..3 {
        let instance = h.engine.sync(case_id).await.unwrap();
        assert_eq!(instance.current_step_key, key("review"));
    }
}

#[tokio::test]
async fn test_full_walk_completes_instance() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    h.evidence.record_action(case_id, "alpha_logged");
    h.evidence.record_action(case_id, "beta_logged");
    h.evidence.record_document(case_id, "id_verification");
    h.evidence.record_action(case_id, "closed");
    sync_until_settled(&h, case_id).await;

    let snapshot = h.store.load_case(case_id).await.unwrap().unwrap();
    assert!(snapshot.instance.completed_at.is_some());
    assert_eq!(snapshot.instance.current_step_key, key("closeout"));
    assert!(snapshot
        .progress
        .iter()
        .all(|row| row.status == StepStatus::Complete));
}

#[tokio::test]
async fn test_sync_publishes_step_events() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    let mut receiver = h.bus.subscribe();
    h.evidence.record_action(case_id, "alpha_logged");
    h.evidence.record_action(case_id, "beta_logged");
    h.engine.sync(case_id).await.unwrap();

    let mut saw_completed = false;
    let mut saw_activated = false;
    while let Ok(event) = receiver.try_recv() {
        match event {
            caseflow_core::domain::events::WorkflowEvent::StepCompleted { step_key, .. } => {
                saw_completed |= step_key == key("intake");
            }
            caseflow_core::domain::events::WorkflowEvent::StepActivated { step_key, .. } => {
                saw_activated |= step_key == key("review");
            }
            _ => {}
        }
    }
    assert!(saw_completed);
    assert!(saw_activated);
}

// ============================================================================
// Override Governor
// ============================================================================

#[tokio::test]
async fn test_override_reshapes_progress() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    let actor = ActorId(uuid::Uuid::new_v4());
    h.engine.initialize(case_id).await.unwrap();

    let instance = h
        .engine
        .apply_override(
            case_id,
            key("closeout"),
            actor,
            "court order".to_string(),
            OverrideCategory::LegalException,
        )
        .await
        .unwrap();
    assert_eq!(instance.current_step_key, key("closeout"));

    let snapshot = h.store.load_case(case_id).await.unwrap().unwrap();
    for row in &snapshot.progress {
        match row.step_key.as_str() {
            "intake" | "review" => {
                assert_eq!(row.status, StepStatus::Complete);
                assert!(row.completed_at.is_some());
                assert!(row.block_reason.is_none());
            }
            "closeout" => {
                assert_eq!(row.status, StepStatus::Active);
                assert!(row.started_at.is_some());
                assert!(row.completed_at.is_none());
            }
            other => panic!("unexpected step {other}"),
        }
    }

    // The override is audited with its categorized justification.
    let entries = h.evidence.entries();
    let audit = entries
        .iter()
        .find(|e| e.action_type == "workflow_override")
        .unwrap();
    assert_eq!(audit.case_id, case_id);
    assert_eq!(audit.actor_id, Some(actor));
    assert_eq!(audit.reason_code, "manual_override");
}

#[tokio::test]
async fn test_override_cap_enforced() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    let actor = ActorId(uuid::Uuid::new_v4());
    h.engine.initialize(case_id).await.unwrap();

    for target in ["review", "closeout", "intake"] {
        h.engine
            .apply_override(
                case_id,
                key(target),
                actor,
                "data fix".to_string(),
                OverrideCategory::DataCorrection,
            )
            .await
            .unwrap();
    }

    let before = h.store.load_case(case_id).await.unwrap().unwrap();
    let result = h
        .engine
        .apply_override(
            case_id,
            key("closeout"),
            actor,
            "one too many".to_string(),
            OverrideCategory::ExecutiveDirective,
        )
        .await;
    assert!(matches!(
        result,
        Err(EngineError::OverrideLimitExceeded { .. })
    ));

    // Rejection leaves state exactly as after the third override.
    let after = h.store.load_case(case_id).await.unwrap().unwrap();
    assert_eq!(before.instance, after.instance);
    assert_eq!(before.progress, after.progress);
    assert_eq!(after.override_count, 3);
}

#[tokio::test]
async fn test_override_invalid_target_rejected() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    let before = h.store.load_case(case_id).await.unwrap().unwrap();
    let result = h
        .engine
        .apply_override(
            case_id,
            key("no_such_step"),
            ActorId(uuid::Uuid::new_v4()),
            "typo".to_string(),
            OverrideCategory::DataCorrection,
        )
        .await;
    assert!(matches!(result, Err(EngineError::InvalidOverrideTarget(_))));

    let after = h.store.load_case(case_id).await.unwrap().unwrap();
    assert_eq!(before.instance, after.instance);
    assert_eq!(after.override_count, 0);
}

#[tokio::test]
async fn test_store_rejects_stale_commit() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    let snapshot = h.store.load_case(case_id).await.unwrap().unwrap();

    // A committed write bumps row_version...
    h.store
        .commit_case(CaseCommit {
            instance: snapshot.instance.clone(),
            progress: vec![],
            new_override: None,
            audit: vec![],
        })
        .await
        .unwrap();

    // ...so replaying the same stale snapshot must conflict.
    let result = h
        .store
        .commit_case(CaseCommit {
            instance: snapshot.instance,
            progress: vec![],
            new_override: None,
            audit: vec![],
        })
        .await;
    assert!(matches!(result, Err(RepositoryError::Conflict(_))));
}

// ============================================================================
// Version Lock
// ============================================================================

#[tokio::test]
async fn test_locked_version_survives_reversioning() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    // A new template version appears after the case locked to v1.
    seed_from_yaml(h.templates.as_ref(), TEST_MANIFEST_V2)
        .await
        .unwrap();
    let latest = h.templates.find_latest(TEST_PROGRAM).await.unwrap().unwrap();
    assert_eq!(latest.template.version, 2);

    // The case keeps evaluating against v1's steps.
    h.evidence.record_action(case_id, "alpha_logged");
    h.evidence.record_action(case_id, "beta_logged");
    let instance = h.engine.sync(case_id).await.unwrap();
    assert_eq!(instance.locked_template_version, 1);
    assert_eq!(instance.current_step_key, key("review"));

    let summary = h.engine.summary(case_id).await.unwrap();
    assert_eq!(summary.template_version, 1);
    let timeline_keys: Vec<&str> = summary
        .timeline
        .iter()
        .map(|entry| entry.step_key.as_str())
        .collect();
    assert_eq!(timeline_keys, vec!["intake", "review", "closeout"]);
}

// ============================================================================
// Projections
// ============================================================================

#[tokio::test]
async fn test_board_covers_every_instance_once() {
    let h = test_harness().await;

    let stuck = new_case(&h);
    h.engine.initialize(stuck).await.unwrap();

    let reviewing = new_case(&h);
    h.engine.initialize(reviewing).await.unwrap();
    h.evidence.record_action(reviewing, "alpha_logged");
    h.evidence.record_action(reviewing, "beta_logged");
    h.engine.sync(reviewing).await.unwrap();

    let done = new_case(&h);
    h.engine.initialize(done).await.unwrap();
    h.evidence.record_action(done, "alpha_logged");
    h.evidence.record_action(done, "beta_logged");
    h.evidence.record_document(done, "id_verification");
    h.evidence.record_action(done, "closed");
    sync_until_settled(&h, done).await;

    let board = h.engine.board().await.unwrap();
    assert_eq!(board.total_cases(), 3);

    let count_in = |name: &str| {
        board
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.cases.len())
            .unwrap_or(0)
    };
    assert_eq!(count_in("Intake"), 1);
    assert_eq!(count_in("Review"), 1);
    assert_eq!(count_in("Done"), 1);
}

#[tokio::test]
async fn test_sla_breach_flagged_in_summary_and_analytics() {
    let h = test_harness().await;
    let case_id = new_case(&h);
    h.engine.initialize(case_id).await.unwrap();

    // Backdate the intake start three days; its SLA is one day.
    let snapshot = h.store.load_case(case_id).await.unwrap().unwrap();
    let mut intake = snapshot
        .progress
        .iter()
        .find(|r| r.step_key == key("intake"))
        .unwrap()
        .clone();
    intake.started_at = Some(chrono::Utc::now() - chrono::Duration::days(3));
    h.store
        .commit_case(CaseCommit {
            instance: snapshot.instance,
            progress: vec![intake],
            new_override: None,
            audit: vec![],
        })
        .await
        .unwrap();

    let summary = h.engine.summary(case_id).await.unwrap();
    let entry = summary
        .timeline
        .iter()
        .find(|e| e.step_key == key("intake"))
        .unwrap();
    assert!(entry.sla_breach);

    let analytics = h.engine.analytics(30).await.unwrap();
    assert_eq!(analytics.sla_breach_count, 1);
    assert_eq!(analytics.blocked_case_count, 1);
    assert!(analytics
        .block_reason_frequency
        .contains_key("missing_action: alpha_logged"));
}

#[tokio::test]
async fn test_analytics_tracks_override_patterns() {
    let h = test_harness().await;
    let actor_a = ActorId(uuid::Uuid::new_v4());
    let actor_b = ActorId(uuid::Uuid::new_v4());

    let first = new_case(&h);
    h.engine.initialize(first).await.unwrap();
    h.engine
        .apply_override(
            first,
            key("review"),
            actor_a,
            "fix".to_string(),
            OverrideCategory::DataCorrection,
        )
        .await
        .unwrap();
    h.engine
        .apply_override(
            first,
            key("closeout"),
            actor_a,
            "exception".to_string(),
            OverrideCategory::LegalException,
        )
        .await
        .unwrap();

    let second = new_case(&h);
    h.engine.initialize(second).await.unwrap();
    h.engine
        .apply_override(
            second,
            key("review"),
            actor_b,
            "recovery".to_string(),
            OverrideCategory::SystemRecovery,
        )
        .await
        .unwrap();

    let analytics = h.engine.analytics(30).await.unwrap();
    assert_eq!(analytics.override_count, 3);
    assert_eq!(analytics.override_by_actor[&actor_a.to_string()], 2);
    assert_eq!(analytics.override_by_actor[&actor_b.to_string()], 1);
    assert_eq!(analytics.override_by_category["data_correction"], 1);
    assert_eq!(analytics.override_by_category["legal_exception"], 1);
    assert_eq!(analytics.override_by_category["system_recovery"], 1);
    assert_eq!(analytics.override_by_case[&first.to_string()], 2);
}

// ============================================================================
// Default Foreclosure Template
// ============================================================================

#[tokio::test]
async fn test_foreclosure_milestones_update_case_status() {
    let h = harness(caseflow_core::domain::workflow::FORECLOSURE_PROGRAM_KEY);
    seed_default_template(h.templates.as_ref()).await.unwrap();
    let case_id = new_case(&h);

    // Ingestion evidence exists before the instance does; initialization's
    // settling sync walks straight through the auto-advance ingestion step.
    h.evidence.record_action(case_id, "auction_import_created");
    h.evidence.record_action(case_id, "lead_created");
    h.evidence.record_action(case_id, "case_created");
    let instance = h.engine.initialize(case_id).await.unwrap();
    assert_eq!(instance.current_step_key, key("contact_homeowner"));

    // Contact and qualification evidence accumulates.
    h.evidence.record_action(case_id, "contact_attempt_logged");
    h.evidence.record_action(case_id, "homeowner_response_logged");
    h.evidence.record_action(case_id, "valid_contact_channel_verified");
    h.evidence.record_document(case_id, "foreclosure_notice");
    h.evidence.record_document(case_id, "occupancy_confirmation");
    h.evidence.record_document(case_id, "id_verification");
    h.evidence.record_action(case_id, "qualification_review_completed");
    sync_until_settled(&h, case_id).await;

    let instance = h.engine.sync(case_id).await.unwrap();
    assert_eq!(instance.current_step_key, key("leaseback_execution"));
    assert_eq!(h.cases.status(case_id), Some(CaseStatus::InProgress));

    // The milestone transition is audited.
    assert!(h
        .evidence
        .entries()
        .iter()
        .any(|e| e.action_type == "case_status_changed"));
}

#[tokio::test]
async fn test_foreclosure_contact_blocking_condition() {
    let h = harness(caseflow_core::domain::workflow::FORECLOSURE_PROGRAM_KEY);
    seed_default_template(h.templates.as_ref()).await.unwrap();
    let case_id = new_case(&h);

    h.evidence.record_action(case_id, "auction_import_created");
    h.evidence.record_action(case_id, "lead_created");
    h.evidence.record_action(case_id, "case_created");
    h.engine.initialize(case_id).await.unwrap();

    // Both contact actions present, but no verified channel.
    h.evidence.record_action(case_id, "contact_attempt_logged");
    h.evidence.record_action(case_id, "homeowner_response_logged");
    h.engine.sync(case_id).await.unwrap();

    let summary = h.engine.summary(case_id).await.unwrap();
    assert_eq!(summary.current_step, key("contact_homeowner"));
    let entry = summary
        .timeline
        .iter()
        .find(|e| e.step_key == key("contact_homeowner"))
        .unwrap();
    assert_eq!(entry.status, StepStatus::Blocked);
    assert_eq!(entry.block_reason.as_deref(), Some("missing_contact_channel"));

    // Verification lifts the condition.
    h.evidence.record_action(case_id, "valid_contact_channel_verified");
    let instance = h.engine.sync(case_id).await.unwrap();
    assert_eq!(instance.current_step_key, key("qualification_review"));
}
