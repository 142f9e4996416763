// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Router-level tests for the HTTP API
//!
//! Each test drives the axum router directly with `tower::ServiceExt::oneshot`
//! over the in-memory backend; no sockets are opened.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use caseflow_core::application::seed::seed_default_template;
use caseflow_core::application::workflow_engine::WorkflowEngine;
use caseflow_core::domain::workflow::{CaseId, FORECLOSURE_PROGRAM_KEY};
use caseflow_core::infrastructure::event_bus::EventBus;
use caseflow_core::infrastructure::repositories::{
    InMemoryCaseDirectory, InMemoryEvidenceLog, InMemoryTemplateRepository, InMemoryWorkflowStore,
};
use caseflow_core::presentation::api;

struct TestApp {
    router: axum::Router,
    evidence: Arc<InMemoryEvidenceLog>,
    cases: Arc<InMemoryCaseDirectory>,
}

async fn test_app() -> TestApp {
    let templates = Arc::new(InMemoryTemplateRepository::new());
    let evidence = Arc::new(InMemoryEvidenceLog::new());
    let store = Arc::new(InMemoryWorkflowStore::new(evidence.clone()));
    let cases = Arc::new(InMemoryCaseDirectory::new());

    seed_default_template(templates.as_ref()).await.unwrap();

    let engine = Arc::new(
        WorkflowEngine::new(
            templates,
            store,
            evidence.clone(),
            cases.clone(),
            EventBus::with_default_capacity(),
        )
        .with_program_key(FORECLOSURE_PROGRAM_KEY),
    );

    TestApp {
        router: api::app(engine),
        evidence,
        cases,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_case_workflow_returns_summary() {
    let app = test_app().await;
    let case_id = CaseId::new();
    app.cases.register(case_id);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/cases/{case_id}/workflow"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["current_step"], "pdf_ingestion");
    assert_eq!(json["template_version"], 1);
    assert_eq!(json["timeline"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_case_workflow_unknown_case_is_404() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/cases/{}/workflow", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_override_requires_actor_header() {
    let app = test_app().await;
    let case_id = CaseId::new();
    app.cases.register(case_id);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/cases/{case_id}/workflow/override"))
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"to_step_key":"completion","reason":"x","reason_category":"legal_exception"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_override_applies_and_reports_limit() {
    let app = test_app().await;
    let case_id = CaseId::new();
    app.cases.register(case_id);
    let actor = uuid::Uuid::new_v4();

    let request = |target: &str| {
        Request::builder()
            .method("POST")
            .uri(format!("/cases/{case_id}/workflow/override"))
            .header("content-type", "application/json")
            .header("x-actor-id", actor.to_string())
            .body(Body::from(format!(
                r#"{{"to_step_key":"{target}","reason":"executive call","reason_category":"executive_directive"}}"#
            )))
            .unwrap()
    };

    for target in ["qualification_review", "rehab_planning", "completion"] {
        let response = app.router.clone().oneshot(request(target)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Fourth override breaches the governance cap.
    let response = app
        .router
        .clone()
        .oneshot(request("contact_homeowner"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("Override limit"));

    // Distinguishable from a bad step key (checked on a case with headroom).
    let fresh_case = CaseId::new();
    app.cases.register(fresh_case);
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/cases/{fresh_case}/workflow/override"))
                .header("content-type", "application/json")
                .header("x-actor-id", actor.to_string())
                .body(Body::from(
                    r#"{"to_step_key":"no_such_step","reason":"typo","reason_category":"data_correction"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("not in the locked template"));
}

#[tokio::test]
async fn test_kanban_covers_all_cases() {
    let app = test_app().await;
    for _ in 0..3 {
        let case_id = CaseId::new();
        app.cases.register(case_id);
        app.evidence.record_action(case_id, "auction_import_created");
        app.evidence.record_action(case_id, "lead_created");
        app.evidence.record_action(case_id, "case_created");
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/cases/{case_id}/workflow"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .router
        .oneshot(Request::builder().uri("/kanban").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let total: usize = json["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|column| column["cases"].as_array().unwrap().len())
        .sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_analytics_endpoint() {
    let app = test_app().await;
    let case_id = CaseId::new();
    app.cases.register(case_id);
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/cases/{case_id}/workflow"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/workflow/analytics?sla_days=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["case_count"], 1);
    assert_eq!(json["default_sla_days"], 10);
}
