use axum::{extract::State, http::StatusCode, Json};
use uuid::Uuid;
use workflow_engine::{ClaimDocuments, DocumentAttachment, DocumentVerification, NewDocument};

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::{roles, AuthContext};
use crate::server::AppState;
use crate::types::{ApiJson, ApiPath};

/// Record a supporting document against a claim; it starts out pending review
pub async fn attach_document(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<NewDocument>,
) -> Result<(StatusCode, Json<ApiResponse<DocumentAttachment>>), ApiError> {
    auth.require_any_role(roles::CLAIM_EDITORS)?;

    let document = state
        .documents
        .attach(claim_id, request, auth.user_id)
        .await?;
    let message = format!("Document {} attached", document.document_name);
    Ok((StatusCode::CREATED, Json(api_success(message, document))))
}

pub async fn claim_documents(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<ClaimDocuments>>, ApiError> {
    let documents = state.documents.list(claim_id).await?;
    let message = format!(
        "{} documents; {} of {} required verified",
        documents.documents.len(),
        documents.summary.verified,
        documents.summary.required
    );
    Ok(Json(api_success(message, documents)))
}

/// Mark a document verified or rejected
pub async fn verify_document(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(document_id): ApiPath<Uuid>,
    ApiJson(decision): ApiJson<DocumentVerification>,
) -> Result<Json<ApiResponse<DocumentAttachment>>, ApiError> {
    auth.require_any_role(roles::DOCUMENT_REVIEWERS)?;

    let document = state
        .documents
        .verify(document_id, decision, auth.user_id)
        .await?;
    let message = format!("Document marked {}", document.verification_status);
    Ok(Json(api_success(message, document)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(document_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, ApiError> {
    auth.require_any_role(roles::DOCUMENT_REVIEWERS)?;

    state.documents.remove(document_id).await?;
    Ok(Json(api_success("Document deleted", document_id)))
}
