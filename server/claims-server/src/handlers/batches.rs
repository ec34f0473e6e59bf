use axum::{extract::State, http::StatusCode, Json};
use claims_service::{Batch, BatchDetail, BatchStatus, NewBatch};
use insurance_service::BatchSubmissionResult;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{api_failure, api_success, ApiError, ApiResponse};
use crate::handlers::mark_submitted;
use crate::middleware::{roles, AuthContext};
use crate::server::AppState;
use crate::types::{ApiJson, ApiPath, ApiQuery};

#[derive(Debug, Deserialize, Default)]
pub struct ListBatchesQuery {
    pub status: Option<BatchStatus>,
}

/// Create a batch from explicit claim ids, a date range, or the batch type's window
pub async fn create_batch(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(request): ApiJson<NewBatch>,
) -> Result<(StatusCode, Json<ApiResponse<Batch>>), ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let batch = state.batches.create_batch(request, auth.user_id).await?;
    let message = format!(
        "Batch {} created with {} claims",
        batch.batch_number, batch.total_claims
    );
    Ok((StatusCode::CREATED, Json(api_success(message, batch))))
}

pub async fn list_batches(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiQuery(query): ApiQuery<ListBatchesQuery>,
) -> Result<Json<ApiResponse<Vec<Batch>>>, ApiError> {
    let batches = state.batches.list_batches(query.status).await?;
    Ok(Json(api_success(
        format!("{} batches", batches.len()),
        batches,
    )))
}

pub async fn get_batch(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(batch_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<BatchDetail>>, ApiError> {
    let detail = state.batches.get_batch(batch_id).await?;
    Ok(Json(api_success("Batch retrieved", detail)))
}

/// Submit every member of a draft batch in one insurer call
pub async fn submit_batch(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(batch_id): ApiPath<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<BatchSubmissionResult>>), ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let result = state.gateway.submit_batch(batch_id, auth.user_id).await?;
    if !result.success {
        let message = result
            .error
            .clone()
            .unwrap_or_else(|| "Batch submission failed".to_string());
        return Ok((StatusCode::BAD_REQUEST, Json(api_failure(message, result))));
    }

    for claim in &result.claims {
        mark_submitted(&state, claim.claim_id, auth.user_id).await;
    }
    let message = format!("Batch submitted with {} claims", result.claims.len());
    Ok((StatusCode::OK, Json(api_success(message, result))))
}

/// Delete a draft batch, releasing its claims
pub async fn delete_batch(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(batch_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<Uuid>>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let released = state.batches.delete_batch(batch_id, auth.user_id).await?;
    let message = format!("Batch deleted; {} claims released", released.len());
    Ok(Json(api_success(message, released)))
}
