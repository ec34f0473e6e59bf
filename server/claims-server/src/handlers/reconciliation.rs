use axum::{extract::State, Json};
use insurance_service::ReconciliationReport;

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::{roles, AuthContext};
use crate::server::AppState;

/// Run one reconciliation sweep now, alongside the periodic one
pub async fn run_reconciliation(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiResponse<ReconciliationReport>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    tracing::info!(user_id = %auth.user_id, "Manual reconciliation sweep requested");
    let report = state.reconciler.run().await?;
    let message = format!(
        "Reconciliation finished: {} claims updated, {} pending resolved",
        report.claims_updated,
        report.pending_confirmed + report.pending_failed
    );
    Ok(Json(api_success(message, report)))
}
