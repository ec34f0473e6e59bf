use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;
use workflow_engine::{
    ActivityEntry, AutomationReport, Workflow, WorkflowFilter, WorkflowStatistics, WorkflowStatus,
};

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::{roles, AuthContext};
use crate::server::AppState;
use crate::types::{ApiJson, ApiPath, ApiQuery, PaginationParams};

#[derive(Debug, Deserialize)]
pub struct InitializeWorkflowRequest {
    pub claim_id: Uuid,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListWorkflowsQuery {
    pub status: Option<WorkflowStatus>,
    pub claim_id: Option<Uuid>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

fn default_auto_advance() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CompleteStepRequest {
    pub notes: Option<String>,
    /// Start the next manual step (or queue the next automated one) right away
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,
}

impl Default for CompleteStepRequest {
    fn default() -> Self {
        Self {
            notes: None,
            auto_advance: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

pub async fn initialize_workflow(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(request): ApiJson<InitializeWorkflowRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Workflow>>), ApiError> {
    let workflow = state
        .workflows
        .initialize_workflow(request.claim_id, auth.user_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(api_success("Workflow initialized", workflow)),
    ))
}

pub async fn list_workflows(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiQuery(query): ApiQuery<ListWorkflowsQuery>,
) -> Result<Json<ApiResponse<Vec<Workflow>>>, ApiError> {
    let pagination = PaginationParams {
        page: query.page,
        page_size: query.page_size,
    };
    let workflows = state
        .workflows
        .list_workflows(&WorkflowFilter {
            status: query.status,
            claim_id: query.claim_id,
            limit: Some(pagination.limit()),
            offset: Some(pagination.offset()),
        })
        .await?;
    Ok(Json(api_success(
        format!("{} workflows", workflows.len()),
        workflows,
    )))
}

pub async fn workflow_statistics(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiResponse<WorkflowStatistics>>, ApiError> {
    let stats = state.workflows.statistics().await?;
    Ok(Json(api_success("Workflow statistics", stats)))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(workflow_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Workflow>>, ApiError> {
    let workflow = state.workflows.get_workflow(workflow_id).await?;
    Ok(Json(api_success("Workflow retrieved", workflow)))
}

pub async fn workflow_by_claim(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Workflow>>, ApiError> {
    let workflow = state.workflows.get_workflow_by_claim(claim_id).await?;
    Ok(Json(api_success("Workflow retrieved", workflow)))
}

pub async fn start_step(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath((workflow_id, step)): ApiPath<(Uuid, String)>,
) -> Result<Json<ApiResponse<Workflow>>, ApiError> {
    let workflow = state
        .workflows
        .start_step(workflow_id, &step, auth.user_id)
        .await?;
    Ok(Json(api_success(format!("Step {step} started"), workflow)))
}

pub async fn complete_step(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath((workflow_id, step)): ApiPath<(Uuid, String)>,
    request: Option<ApiJson<CompleteStepRequest>>,
) -> Result<Json<ApiResponse<Workflow>>, ApiError> {
    let request = request.map(|ApiJson(body)| body).unwrap_or_default();
    let workflow = state
        .workflows
        .complete_step(
            workflow_id,
            &step,
            auth.user_id,
            request.notes,
            request.auto_advance,
        )
        .await?;
    Ok(Json(api_success(format!("Step {step} completed"), workflow)))
}

/// Skip an optional step
pub async fn skip_step(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath((workflow_id, step)): ApiPath<(Uuid, String)>,
    request: Option<ApiJson<ReasonRequest>>,
) -> Result<Json<ApiResponse<Workflow>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let request = request.map(|ApiJson(body)| body).unwrap_or_default();
    let workflow = state
        .workflows
        .skip_step(workflow_id, &step, auth.user_id, request.reason)
        .await?;
    Ok(Json(api_success(format!("Step {step} skipped"), workflow)))
}

/// Run the workflow's runnable automated steps now
///
/// A failing action is reported in the body, not as an error: the step is
/// marked failed and the workflow waits for a human.
pub async fn process_automation(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(workflow_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<AutomationReport>>, ApiError> {
    let report = state
        .workflows
        .process_automated_steps(workflow_id, auth.user_id)
        .await?;
    let message = match &report.failed_step {
        Some(step) => format!("Automated step {step} failed; workflow needs attention"),
        None => format!("{} automated steps executed", report.executed.len()),
    };
    Ok(Json(api_success(message, report)))
}

pub async fn cancel_workflow(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(workflow_id): ApiPath<Uuid>,
    request: Option<ApiJson<ReasonRequest>>,
) -> Result<Json<ApiResponse<Workflow>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let request = request.map(|ApiJson(body)| body).unwrap_or_default();
    let workflow = state
        .workflows
        .cancel_workflow(workflow_id, auth.user_id, request.reason)
        .await?;
    Ok(Json(api_success("Workflow cancelled", workflow)))
}

pub async fn workflow_activity(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(workflow_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<ActivityEntry>>>, ApiError> {
    let activity = state.workflows.activity(workflow_id).await?;
    Ok(Json(api_success(
        format!("{} activity entries", activity.len()),
        activity,
    )))
}
