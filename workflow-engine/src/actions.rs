// Actions bound to automated workflow steps
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use claims_service::{ClaimStore, ClaimsError, InvoiceGenerator};
use uuid::Uuid;

use crate::documents::DocumentStore;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::PaymentTracking;
use crate::repository::WorkflowRepository;
use crate::template::{COMPLIANCE_VERIFICATION, INVOICE_GENERATION, PAYMENT_TRACKING};
use crate::workflow::now;

/// Interval between payment status checks when not configured
pub const DEFAULT_PAYMENT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// What an action runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionContext {
    pub workflow_id: Uuid,
    pub claim_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub triggered_by: Uuid,
}

/// Result of a successful action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Recorded as the step's notes
    pub notes: Option<String>,
    /// Invoice to attach to the workflow instance
    pub invoice_id: Option<Uuid>,
}

impl ActionOutcome {
    pub fn note(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            invoice_id: None,
        }
    }
}

/// Work performed when an automated step runs
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Name of the step this action is bound to
    fn step(&self) -> &'static str;

    async fn execute(&self, ctx: &ActionContext) -> WorkflowResult<ActionOutcome>;
}

fn failed(step: &str, reason: impl Into<String>) -> WorkflowError {
    WorkflowError::AutomationFailed {
        step: step.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// COMPLIANCE VERIFICATION
// ============================================================================

/// Required documents verified and the claim checklist clean
pub struct ComplianceVerificationAction {
    claims: ClaimStore,
    documents: Arc<dyn DocumentStore>,
}

impl ComplianceVerificationAction {
    pub fn new(claims: ClaimStore, documents: Arc<dyn DocumentStore>) -> Self {
        Self { claims, documents }
    }
}

#[async_trait]
impl StepAction for ComplianceVerificationAction {
    fn step(&self) -> &'static str {
        COMPLIANCE_VERIFICATION
    }

    async fn execute(&self, ctx: &ActionContext) -> WorkflowResult<ActionOutcome> {
        let documents = self.documents.summarize(ctx.claim_id).await?;
        if documents.required == 0 {
            return Err(failed(
                self.step(),
                "no required supporting documents are attached",
            ));
        }
        if !documents.is_complete() {
            return Err(failed(
                self.step(),
                format!(
                    "{} of {} required documents verified",
                    documents.verified, documents.required
                ),
            ));
        }

        let check = self
            .claims
            .record_compliance(ctx.claim_id, ctx.triggered_by)
            .await?;
        if !check.is_clean() {
            return Err(failed(self.step(), check.issues.join("; ")));
        }
        Ok(ActionOutcome::note(format!(
            "Checklist clean; {} required documents verified",
            documents.verified
        )))
    }
}

// ============================================================================
// INVOICE GENERATION
// ============================================================================

/// Generates the pre-submission invoice, or adopts one generated by hand
pub struct InvoiceGenerationAction {
    invoices: InvoiceGenerator,
}

impl InvoiceGenerationAction {
    pub fn new(invoices: InvoiceGenerator) -> Self {
        Self { invoices }
    }
}

#[async_trait]
impl StepAction for InvoiceGenerationAction {
    fn step(&self) -> &'static str {
        INVOICE_GENERATION
    }

    async fn execute(&self, ctx: &ActionContext) -> WorkflowResult<ActionOutcome> {
        let invoice = match self
            .invoices
            .generate_invoice(ctx.claim_id, ctx.triggered_by)
            .await
        {
            Ok(invoice) => invoice,
            Err(ClaimsError::DuplicateInvoice { claim_id }) => self
                .invoices
                .open_invoice_for_claim(claim_id)
                .await?
                .ok_or(ClaimsError::DuplicateInvoice { claim_id })?,
            Err(err) => return Err(err.into()),
        };

        Ok(ActionOutcome {
            notes: Some(format!("Invoice {} ready for review", invoice.invoice_number)),
            invoice_id: Some(invoice.id),
        })
    }
}

// ============================================================================
// PAYMENT TRACKING
// ============================================================================

/// Schedules the recurring payment status check
pub struct PaymentTrackingAction {
    repo: Arc<dyn WorkflowRepository>,
    check_interval: Duration,
}

impl PaymentTrackingAction {
    pub fn new(repo: Arc<dyn WorkflowRepository>, check_interval: Duration) -> Self {
        Self {
            repo,
            check_interval,
        }
    }
}

#[async_trait]
impl StepAction for PaymentTrackingAction {
    fn step(&self) -> &'static str {
        PAYMENT_TRACKING
    }

    async fn execute(&self, ctx: &ActionContext) -> WorkflowResult<ActionOutcome> {
        let created_at = now();
        let interval = chrono::Duration::from_std(self.check_interval)
            .map_err(|e| failed(self.step(), format!("invalid check interval: {e}")))?;
        let record = PaymentTracking {
            id: Uuid::new_v4(),
            claim_id: ctx.claim_id,
            workflow_id: ctx.workflow_id,
            auto_check_enabled: true,
            next_check_at: created_at + interval,
            created_at,
        };
        self.repo.insert_payment_tracking(&record).await?;

        tracing::info!(
            claim_id = %ctx.claim_id,
            next_check_at = %record.next_check_at,
            "Payment tracking scheduled"
        );
        Ok(ActionOutcome::note(format!(
            "Next payment check at {}",
            record.next_check_at
        )))
    }
}

/// The three actions of the SHA template
pub fn standard_actions(
    claims: ClaimStore,
    invoices: InvoiceGenerator,
    documents: Arc<dyn DocumentStore>,
    repo: Arc<dyn WorkflowRepository>,
    payment_check_interval: Duration,
) -> Vec<Arc<dyn StepAction>> {
    vec![
        Arc::new(ComplianceVerificationAction::new(claims, documents)),
        Arc::new(InvoiceGenerationAction::new(invoices)),
        Arc::new(PaymentTrackingAction::new(repo, payment_check_interval)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryWorkflowRepository;

    #[tokio::test]
    async fn test_payment_tracking_schedules_next_check() {
        let repo = Arc::new(MemoryWorkflowRepository::new());
        let action = PaymentTrackingAction::new(repo.clone(), Duration::from_secs(3600));
        let ctx = ActionContext {
            workflow_id: Uuid::new_v4(),
            claim_id: Uuid::new_v4(),
            invoice_id: None,
            triggered_by: Uuid::nil(),
        };

        let outcome = action.execute(&ctx).await.unwrap();
        assert!(outcome.notes.is_some());

        let records = repo.payment_tracking_for_claim(ctx.claim_id).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.auto_check_enabled);
        assert_eq!(
            record.next_check_at - record.created_at,
            chrono::Duration::hours(1)
        );
    }
}
