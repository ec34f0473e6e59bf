use axum::{extract::State, http::StatusCode, Json};
use chrono::NaiveDate;
use claims_service::{
    Claim, ClaimDetail, ClaimFilter, ClaimStatus, NewClaim, SubmissionLog,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::{roles, AuthContext};
use crate::server::AppState;
use crate::types::{ApiJson, ApiPath, ApiQuery, PaginationParams};

#[derive(Debug, Deserialize, Default)]
pub struct ListClaimsQuery {
    pub status: Option<ClaimStatus>,
    pub batch_id: Option<Uuid>,
    pub op_number: Option<String>,
    pub member_number: Option<String>,
    pub visit_from: Option<NaiveDate>,
    pub visit_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListClaimsQuery {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            page_size: self.page_size,
        }
    }

    fn filter(&self) -> ClaimFilter {
        ClaimFilter {
            status: self.status,
            batch_id: self.batch_id,
            op_number: self.op_number.clone(),
            member_number: self.member_number.clone(),
            visit_from: self.visit_from,
            visit_to: self.visit_to,
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            ..ClaimFilter::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ClaimStatus,
    pub reason: Option<String>,
}

/// New claim with the workflow opened for it
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedClaim {
    #[serde(flatten)]
    pub detail: ClaimDetail,
    /// Absent when the workflow could not be opened; retry with `POST /sha-workflows`
    pub workflow_id: Option<Uuid>,
}

/// Create a claim from a completed encounter and open its workflow
pub async fn create_claim(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(request): ApiJson<NewClaim>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedClaim>>), ApiError> {
    auth.require_any_role(roles::CLAIM_AUTHORS)?;

    let detail = state.claims.create_claim(request, auth.user_id).await?;
    let workflow_id = match state
        .workflows
        .initialize_workflow(detail.claim.id, auth.user_id)
        .await
    {
        Ok(workflow) => Some(workflow.id()),
        Err(err) => {
            tracing::error!(
                claim_id = %detail.claim.id,
                error = %err,
                "Claim created but its workflow could not be initialized"
            );
            None
        }
    };

    let message = format!("Claim {} created", detail.claim.claim_number);
    Ok((
        StatusCode::CREATED,
        Json(api_success(message, CreatedClaim { detail, workflow_id })),
    ))
}

pub async fn list_claims(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiQuery(query): ApiQuery<ListClaimsQuery>,
) -> Result<Json<ApiResponse<Vec<Claim>>>, ApiError> {
    let pagination = query.pagination();
    let mut filter = query.filter();
    let total = state.claims.count_claims(&filter).await?;

    filter.limit = Some(pagination.limit());
    filter.offset = Some(pagination.offset());
    let claims = state.claims.list_claims(&filter).await?;

    Ok(Json(pagination.wrap_response(
        format!("{} claims", claims.len()),
        claims,
        total,
    )))
}

pub async fn get_claim(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<ClaimDetail>>, ApiError> {
    let detail = state.claims.get_claim(claim_id).await?;
    Ok(Json(api_success("Claim retrieved", detail)))
}

/// Manual status change (correction, resubmission after rejection, recorded outcome)
pub async fn update_claim_status(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<Claim>>, ApiError> {
    auth.require_any_role(roles::CLAIM_EDITORS)?;

    let claim = state
        .claims
        .transition_status(claim_id, request.status, auth.user_id, request.reason)
        .await?;
    let message = format!("Claim {} is now {}", claim.claim_number, claim.status);
    Ok(Json(api_success(message, claim)))
}

pub async fn delete_claim(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, ApiError> {
    auth.require_any_role(roles::ADMINS)?;

    state.claims.delete_claim(claim_id, auth.user_id).await?;
    Ok(Json(api_success("Claim deleted", claim_id)))
}

pub async fn claim_submissions(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<SubmissionLog>>>, ApiError> {
    let history = state.claims.submission_history(claim_id).await?;
    Ok(Json(api_success(
        format!("{} submission attempts", history.len()),
        history,
    )))
}
