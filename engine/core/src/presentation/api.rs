//! HTTP API over the workflow engine
//!
//! Thin axum handlers: parse the request, call the engine, map the error
//! taxonomy onto status codes. Authorization (who may override) is enforced
//! by the surrounding system before requests reach these routes; the actor
//! identity arrives in the `x-actor-id` header.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::workflow_engine::{EngineError, WorkflowEngine};
use crate::domain::workflow::{ActorId, CaseId, OverrideCategory, StepKey};

pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
}

pub fn app(engine: Arc<WorkflowEngine>) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/cases/{case_id}/workflow", get(case_workflow).post(case_workflow))
        .route("/cases/{case_id}/workflow/override", post(case_workflow_override))
        .route("/kanban", get(kanban))
        .route("/workflow/analytics", get(analytics))
        .route("/workflow/reports/stage-distribution", get(report_stage_distribution))
        .route("/workflow/reports/time-per-stage", get(report_time_per_stage))
        .route("/workflow/reports/block-reasons", get(report_block_reasons))
        .route("/workflow/reports/sla-breaches", get(report_sla_breaches))
        .route("/workflow/reports/refinance-ready", get(report_refinance_ready))
        .with_state(state)
}

// ============================================================================
// Error Mapping
// ============================================================================

struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::CaseNotFound(_) | EngineError::InstanceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::InvalidOverrideTarget(_)
            | EngineError::OverrideLimitExceeded { .. } => StatusCode::BAD_REQUEST,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::TemplateNotFound(_)
            | EngineError::Derivation(_)
            | EngineError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /cases/{case_id}/workflow` - initialize + sync + summary
async fn case_workflow(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let case_id = CaseId(case_id);
    state.engine.initialize(case_id).await?;
    let summary = state.engine.summary(case_id).await?;
    Ok(Json(summary).into_response())
}

#[derive(Deserialize)]
pub struct OverrideRequest {
    pub to_step_key: String,
    pub reason: String,
    pub reason_category: OverrideCategory,
}

/// `POST /cases/{case_id}/workflow/override` - bounded manual jump
async fn case_workflow_override(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<OverrideRequest>,
) -> Result<Response, ApiError> {
    let case_id = CaseId(case_id);

    let actor_id = match headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
    {
        Some(id) => ActorId(id),
        None => return Ok(bad_request("Missing or invalid x-actor-id header")),
    };
    let to_step_key = match StepKey::new(body.to_step_key) {
        Ok(key) => key,
        Err(_) => return Ok(bad_request("to_step_key must not be empty")),
    };
    if body.reason.trim().is_empty() {
        return Ok(bad_request("reason must not be empty"));
    }

    state.engine.initialize(case_id).await?;
    state
        .engine
        .apply_override(case_id, to_step_key, actor_id, body.reason, body.reason_category)
        .await?;
    let summary = state.engine.summary(case_id).await?;
    Ok(Json(summary).into_response())
}

/// `GET /kanban` - board projection
async fn kanban(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let board = state.engine.board().await?;
    Ok(Json(board).into_response())
}

#[derive(Deserialize)]
pub struct AnalyticsParams {
    pub sla_days: Option<i64>,
}

/// `GET /workflow/analytics?sla_days=N` - portfolio metrics
async fn analytics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyticsParams>,
) -> Result<Response, ApiError> {
    let metrics = state.engine.analytics(params.sla_days.unwrap_or(30)).await?;
    Ok(Json(metrics).into_response())
}

/// `GET /workflow/reports/stage-distribution`
async fn report_stage_distribution(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let board = state.engine.board().await?;
    let distribution: Vec<_> = board
        .columns
        .iter()
        .map(|column| json!({ "stage": column.name, "count": column.cases.len() }))
        .collect();
    Ok(Json(json!({ "stage_distribution": distribution })).into_response())
}

/// `GET /workflow/reports/time-per-stage`
async fn report_time_per_stage(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let metrics = state.engine.analytics(30).await?;
    Ok(Json(json!({ "avg_days_per_stage": metrics.avg_days_per_stage })).into_response())
}

/// `GET /workflow/reports/block-reasons`
async fn report_block_reasons(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let metrics = state.engine.analytics(30).await?;
    Ok(Json(json!({ "block_reason_frequency": metrics.block_reason_frequency })).into_response())
}

/// `GET /workflow/reports/sla-breaches`
async fn report_sla_breaches(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let metrics = state.engine.analytics(30).await?;
    Ok(Json(json!({
        "sla_breach_count": metrics.sla_breach_count,
        "time_risk_count": metrics.time_risk_count,
    }))
    .into_response())
}

/// `GET /workflow/reports/refinance-ready`
async fn report_refinance_ready(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let board = state.engine.board().await?;
    let ready = board
        .columns
        .iter()
        .find(|column| column.name == "Refinance Ready");
    let cases = ready.map(|column| column.cases.clone()).unwrap_or_default();
    Ok(Json(json!({
        "refinance_ready_count": cases.len(),
        "cases": cases,
    }))
    .into_response())
}
