use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use claims_service::{BatchReport, ClaimExportFilter};
use uuid::Uuid;

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::{roles, AuthContext};
use crate::server::AppState;
use crate::types::{ApiPath, ApiQuery};

pub async fn batch_report(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(batch_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<BatchReport>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let report = state.exports.batch_report(batch_id).await?;
    let message = format!(
        "Report for batch {} with {} claims",
        report.batch.batch_number, report.total_claims
    );
    Ok(Json(api_success(message, report)))
}

/// Claims in the insurer portal's upload layout, served as a CSV attachment
pub async fn claims_csv(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(filter): ApiQuery<ClaimExportFilter>,
) -> Result<Response, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let csv = state.exports.claims_csv(&filter).await?;
    let disposition = format!(
        "attachment; filename=\"sha-claims-{}.csv\"",
        Utc::now().format("%Y%m%d%H%M%S")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv.content,
    )
        .into_response())
}
