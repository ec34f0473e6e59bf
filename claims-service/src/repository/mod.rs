//! Persistence seam for the claims domain
//!
//! Every method that changes more than one row is atomic: the Postgres
//! implementation wraps it in a transaction, the in-memory implementation
//! applies it under one lock after all checks pass. Conditional updates
//! (`WHERE status = ...`) guard every state change, so a concurrent writer
//! that got there first turns into a business error rather than a lost update.

mod memory;
mod postgres;

pub use memory::MemoryClaimsRepository;
pub use postgres::PgClaimsRepository;

use async_trait::async_trait;
use audit_engine::AuditEntry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ClaimsResult;
use crate::models::{
    Batch, BatchStatus, Claim, ClaimFilter, ClaimItem, ClaimStatus, ComplianceStatus, Invoice,
    InvoiceFilter, InvoiceUpdate, SubmissionLog, SubmissionTarget,
};
use crate::numbering::NumberScope;

/// A guarded claim status change plus its audit entry
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub claim_id: Uuid,
    pub from: ClaimStatus,
    pub to: ClaimStatus,
    /// Resubmission drops the batch assignment
    pub clear_batch: bool,
    pub at: DateTime<Utc>,
    pub audit: AuditEntry,
}

/// How a new batch picks its member claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSelection {
    Claims(Vec<Uuid>),
    /// Claims created in `[start, end)`
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Local effects of a confirmed single-claim submission
#[derive(Debug, Clone)]
pub struct ClaimSubmissionOutcome {
    pub log_id: Uuid,
    pub claim_id: Uuid,
    pub invoice_id: Uuid,
    pub sha_reference: String,
    pub response_payload: serde_json::Value,
    pub submitted_by: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub audit: AuditEntry,
}

/// Per-claim part of a confirmed batch submission
#[derive(Debug, Clone)]
pub struct BatchClaimOutcome {
    pub claim_id: Uuid,
    pub invoice_id: Uuid,
    pub sha_reference: String,
    pub audit: AuditEntry,
}

/// Local effects of a confirmed batch submission
#[derive(Debug, Clone)]
pub struct BatchSubmissionOutcome {
    pub log_id: Uuid,
    pub batch_id: Uuid,
    pub sha_batch_reference: String,
    pub response_payload: serde_json::Value,
    pub submitted_by: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub claims: Vec<BatchClaimOutcome>,
}

/// A submission attempt that ended without an insurer reference
#[derive(Debug, Clone)]
pub struct SubmissionFailure {
    pub log_id: Uuid,
    pub error_message: String,
    pub response_payload: Option<serde_json::Value>,
    pub completed_at: DateTime<Utc>,
    pub audits: Vec<AuditEntry>,
}

/// Forward-only status change observed at the insurer
#[derive(Debug, Clone)]
pub struct RemoteStatusUpdate {
    pub claim_id: Uuid,
    pub from: ClaimStatus,
    pub to: ClaimStatus,
    pub approved_amount: Option<Decimal>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub audit: AuditEntry,
}

#[async_trait]
pub trait ClaimsRepository: Send + Sync {
    /// Allocate the next value of a per-period counter
    async fn next_sequence(&self, scope: NumberScope, period: &str) -> ClaimsResult<i64>;

    // Claims

    /// Write a claim with its items and creation audit
    async fn insert_claim(
        &self,
        claim: &Claim,
        items: &[ClaimItem],
        audit: &AuditEntry,
    ) -> ClaimsResult<()>;
    async fn find_claim(&self, claim_id: Uuid) -> ClaimsResult<Option<Claim>>;
    async fn claim_items(&self, claim_id: Uuid) -> ClaimsResult<Vec<ClaimItem>>;
    async fn list_claims(&self, filter: &ClaimFilter) -> ClaimsResult<Vec<Claim>>;
    async fn count_claims(&self, filter: &ClaimFilter) -> ClaimsResult<i64>;
    /// Apply a status change if the claim is still in `change.from`
    async fn update_claim_status(&self, change: &StatusChange) -> ClaimsResult<Claim>;
    /// Record a checklist outcome on the claim and its open invoice
    async fn set_compliance_status(
        &self,
        claim_id: Uuid,
        status: ComplianceStatus,
        audit: &AuditEntry,
    ) -> ClaimsResult<()>;
    /// Remove an unbatched, uninvoiced draft or ready claim
    async fn delete_claim(&self, claim_id: Uuid, audit: &AuditEntry) -> ClaimsResult<()>;

    // Invoices

    /// Write the invoice and move its claim `ready_to_submit -> invoice_ready`
    async fn insert_invoice(&self, invoice: &Invoice, audit: &AuditEntry) -> ClaimsResult<()>;
    async fn find_invoice(&self, invoice_id: Uuid) -> ClaimsResult<Option<Invoice>>;
    /// All revisions for a claim, oldest first
    async fn invoices_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<Invoice>>;
    async fn list_invoices(&self, filter: &InvoiceFilter) -> ClaimsResult<Vec<Invoice>>;
    async fn mark_invoice_printed(
        &self,
        invoice_id: Uuid,
        printed_by: Uuid,
        printed_at: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> ClaimsResult<Invoice>;
    async fn update_invoice(
        &self,
        invoice_id: Uuid,
        update: &InvoiceUpdate,
        audit: &AuditEntry,
    ) -> ClaimsResult<Invoice>;

    // Batches

    /// Write the batch and claim its members with a conditional update
    async fn create_batch(&self, batch: &Batch, selection: &BatchSelection) -> ClaimsResult<Batch>;
    async fn find_batch(&self, batch_id: Uuid) -> ClaimsResult<Option<Batch>>;
    async fn list_batches(&self, status: Option<BatchStatus>) -> ClaimsResult<Vec<Batch>>;
    async fn batch_claims(&self, batch_id: Uuid) -> ClaimsResult<Vec<Claim>>;
    /// Release members of a draft batch and remove it; returns the released claim ids
    async fn delete_batch(&self, batch_id: Uuid, deleted_by: Uuid) -> ClaimsResult<Vec<Uuid>>;
    /// Mark a submitted batch completed once every member has an outcome
    async fn complete_batch(&self, batch_id: Uuid) -> ClaimsResult<bool>;

    // Submissions

    /// Persist a pending attempt before the external call
    async fn begin_submission(&self, log: &SubmissionLog) -> ClaimsResult<()>;
    async fn previous_attempts(&self, target: SubmissionTarget) -> ClaimsResult<i32>;
    async fn fail_submission(&self, failure: &SubmissionFailure) -> ClaimsResult<()>;
    async fn complete_claim_submission(&self, outcome: &ClaimSubmissionOutcome)
        -> ClaimsResult<()>;
    async fn complete_batch_submission(&self, outcome: &BatchSubmissionOutcome)
        -> ClaimsResult<()>;
    async fn find_submission_log(&self, log_id: Uuid) -> ClaimsResult<Option<SubmissionLog>>;
    /// Single-claim attempts plus attempts for the claim's current batch, newest first
    async fn submission_logs_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<SubmissionLog>>;
    async fn stale_pending_submissions(
        &self,
        created_before: DateTime<Utc>,
    ) -> ClaimsResult<Vec<SubmissionLog>>;

    // Reconciliation

    /// Submitted or approved claims that carry an insurer reference
    async fn claims_awaiting_outcome(&self) -> ClaimsResult<Vec<Claim>>;
    /// Apply a reconciled status if the claim is still in `update.from`
    async fn apply_remote_status(&self, update: &RemoteStatusUpdate) -> ClaimsResult<bool>;

    // Audit

    async fn append_audit(&self, entry: &AuditEntry) -> ClaimsResult<()>;
    async fn audit_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<AuditEntry>>;
    async fn audit_for_invoice(&self, invoice_id: Uuid) -> ClaimsResult<Vec<AuditEntry>>;
}
