pub mod batches;
pub mod claims;
pub mod documents;
pub mod exports;
pub mod health;
pub mod invoices;
pub mod reconciliation;
pub mod workflows;

use uuid::Uuid;
use workflow_engine::CLAIM_SUBMISSION;

use crate::server::AppState;

/// Complete the claim's workflow submission step after a successful submission
///
/// The submission itself is already committed, so a workflow failure here is
/// logged and does not fail the request.
pub(crate) async fn mark_submitted(state: &AppState, claim_id: Uuid, user_id: Uuid) {
    if let Err(err) = state
        .workflows
        .record_external_completion(claim_id, CLAIM_SUBMISSION, user_id)
        .await
    {
        tracing::warn!(
            claim_id = %claim_id,
            error = %err,
            "Submission not recorded on workflow"
        );
    }
}
