// In-memory repository backing tests and local tooling
use std::collections::HashMap;

use async_trait::async_trait;
use audit_engine::{AuditDetails, AuditEntry};
use chrono::{DateTime, Utc};
use database_layer::DatabaseError;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    BatchSelection, BatchSubmissionOutcome, ClaimSubmissionOutcome, ClaimsRepository,
    RemoteStatusUpdate, StatusChange, SubmissionFailure,
};
use crate::error::{ClaimsError, ClaimsResult};
use crate::models::{
    Batch, BatchStatus, Claim, ClaimFilter, ClaimItem, ClaimStatus, ComplianceStatus, Invoice,
    InvoiceFilter, InvoiceStatus, InvoiceUpdate, SubmissionLog, SubmissionStatus,
    SubmissionTarget, SubmissionType,
};
use crate::numbering::NumberScope;

#[derive(Debug, Default)]
struct MemoryState {
    sequences: HashMap<(NumberScope, String), i64>,
    claims: HashMap<Uuid, Claim>,
    items: HashMap<Uuid, Vec<ClaimItem>>,
    invoices: HashMap<Uuid, Invoice>,
    batches: HashMap<Uuid, Batch>,
    submissions: HashMap<Uuid, SubmissionLog>,
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn claim(&self, claim_id: Uuid) -> ClaimsResult<&Claim> {
        self.claims
            .get(&claim_id)
            .ok_or_else(|| ClaimsError::not_found("Claim", claim_id))
    }

    fn claim_mut(&mut self, claim_id: Uuid) -> ClaimsResult<&mut Claim> {
        self.claims
            .get_mut(&claim_id)
            .ok_or_else(|| ClaimsError::not_found("Claim", claim_id))
    }

    fn invoice_mut(&mut self, invoice_id: Uuid) -> ClaimsResult<&mut Invoice> {
        self.invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| ClaimsError::not_found("Invoice", invoice_id))
    }

    fn open_invoice(&self, claim_id: Uuid) -> Option<&Invoice> {
        self.invoices
            .values()
            .find(|i| i.claim_id == claim_id && !i.status.is_locked())
    }

    fn record(&mut self, entry: AuditEntry) {
        entry.trace();
        self.audit.push(entry);
    }

    fn pending_log(&self, log_id: Uuid) -> ClaimsResult<&SubmissionLog> {
        let log = self
            .submissions
            .get(&log_id)
            .ok_or_else(|| ClaimsError::not_found("Submission log", log_id))?;
        if log.status != SubmissionStatus::Pending {
            return Err(ClaimsError::invalid_transition(log.status, "completed"));
        }
        Ok(log)
    }

    fn finish_log(
        &mut self,
        log_id: Uuid,
        status: SubmissionStatus,
        response: Option<serde_json::Value>,
        error_message: Option<String>,
        completed_at: DateTime<Utc>,
    ) {
        if let Some(log) = self.submissions.get_mut(&log_id) {
            log.status = status;
            log.response_payload = response;
            log.error_message = error_message;
            log.completed_at = Some(completed_at);
        }
    }

    /// Check a claim/invoice pair can be locked by a submission
    fn check_lockable(&self, claim_id: Uuid, invoice_id: Uuid) -> ClaimsResult<()> {
        let claim = self.claim(claim_id)?;
        if claim.status != ClaimStatus::InvoiceReady {
            return Err(ClaimsError::invalid_transition(
                claim.status,
                ClaimStatus::Submitted,
            ));
        }
        let invoice = self
            .invoices
            .get(&invoice_id)
            .ok_or_else(|| ClaimsError::not_found("Invoice", invoice_id))?;
        if invoice.status.is_locked() {
            return Err(ClaimsError::InvoiceLocked {
                invoice_number: invoice.invoice_number.clone(),
            });
        }
        Ok(())
    }

    fn lock_claim_and_invoice(
        &mut self,
        claim_id: Uuid,
        invoice_id: Uuid,
        sha_reference: &str,
        submitted_by: Uuid,
        submitted_at: DateTime<Utc>,
    ) {
        if let Some(claim) = self.claims.get_mut(&claim_id) {
            claim.status = ClaimStatus::Submitted;
            claim
                .sha_reference
                .get_or_insert_with(|| sha_reference.to_string());
            claim.submission_date = Some(submitted_at);
            claim.updated_at = submitted_at;
        }
        if let Some(invoice) = self.invoices.get_mut(&invoice_id) {
            invoice.status = InvoiceStatus::Submitted;
            invoice.submitted_by = Some(submitted_by);
            invoice.submitted_at = Some(submitted_at);
            invoice.sha_reference = Some(sha_reference.to_string());
            invoice.updated_at = submitted_at;
        }
    }
}

fn page<T>(rows: Vec<T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let offset = offset.and_then(|o| usize::try_from(o).ok()).unwrap_or(0);
    let limit = limit
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

fn unique_violation(constraint: &str) -> ClaimsError {
    ClaimsError::Persistence(DatabaseError::UniqueViolation {
        constraint: constraint.to_string(),
    })
}

/// [`ClaimsRepository`] over a single mutex-guarded state
#[derive(Debug, Default)]
pub struct MemoryClaimsRepository {
    state: Mutex<MemoryState>,
}

impl MemoryClaimsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClaimsRepository for MemoryClaimsRepository {
    async fn next_sequence(&self, scope: NumberScope, period: &str) -> ClaimsResult<i64> {
        let mut state = self.state.lock();
        let value = state
            .sequences
            .entry((scope, period.to_string()))
            .or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn insert_claim(
        &self,
        claim: &Claim,
        items: &[ClaimItem],
        audit: &AuditEntry,
    ) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        if state
            .claims
            .values()
            .any(|c| c.claim_number == claim.claim_number)
        {
            return Err(unique_violation("claims_claim_number_key"));
        }
        state.claims.insert(claim.id, claim.clone());
        state.items.insert(claim.id, items.to_vec());
        state.record(audit.clone());
        Ok(())
    }

    async fn find_claim(&self, claim_id: Uuid) -> ClaimsResult<Option<Claim>> {
        Ok(self.state.lock().claims.get(&claim_id).cloned())
    }

    async fn claim_items(&self, claim_id: Uuid) -> ClaimsResult<Vec<ClaimItem>> {
        Ok(self
            .state
            .lock()
            .items
            .get(&claim_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_claims(&self, filter: &ClaimFilter) -> ClaimsResult<Vec<Claim>> {
        let state = self.state.lock();
        let mut claims: Vec<Claim> = state
            .claims
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        claims.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.claim_number.cmp(&a.claim_number))
        });
        Ok(page(claims, filter.limit, filter.offset))
    }

    async fn count_claims(&self, filter: &ClaimFilter) -> ClaimsResult<i64> {
        let state = self.state.lock();
        let count = state.claims.values().filter(|c| filter.matches(c)).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn update_claim_status(&self, change: &StatusChange) -> ClaimsResult<Claim> {
        let mut state = self.state.lock();
        let claim = state.claim_mut(change.claim_id)?;
        if claim.status != change.from {
            return Err(ClaimsError::invalid_transition(claim.status, change.to));
        }
        claim.status = change.to;
        claim.updated_at = change.at;
        if change.clear_batch {
            claim.batch_id = None;
        }
        let updated = claim.clone();
        state.record(change.audit.clone());
        Ok(updated)
    }

    async fn set_compliance_status(
        &self,
        claim_id: Uuid,
        status: ComplianceStatus,
        audit: &AuditEntry,
    ) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        let claim = state.claim_mut(claim_id)?;
        claim.compliance_status = status;
        claim.updated_at = Utc::now();
        for invoice in state
            .invoices
            .values_mut()
            .filter(|i| i.claim_id == claim_id && !i.status.is_locked())
        {
            invoice.compliance_status = status;
        }
        state.record(audit.clone());
        Ok(())
    }

    async fn delete_claim(&self, claim_id: Uuid, audit: &AuditEntry) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        let claim = state.claim(claim_id)?;
        let has_invoice = state.invoices.values().any(|i| i.claim_id == claim_id);
        let deletable = matches!(claim.status, ClaimStatus::Draft | ClaimStatus::ReadyToSubmit)
            && claim.batch_id.is_none()
            && !has_invoice;
        if !deletable {
            return Err(ClaimsError::invalid_transition(claim.status, "deleted"));
        }
        state.claims.remove(&claim_id);
        state.items.remove(&claim_id);
        state.record(audit.clone());
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice, audit: &AuditEntry) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        let claim_status = state.claim(invoice.claim_id)?.status;
        if state.open_invoice(invoice.claim_id).is_some()
            || state
                .invoices
                .values()
                .any(|i| i.claim_id == invoice.claim_id && i.revision == invoice.revision)
        {
            return Err(ClaimsError::DuplicateInvoice {
                claim_id: invoice.claim_id,
            });
        }
        if state
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice.invoice_number)
        {
            return Err(unique_violation("sha_invoices_invoice_number_key"));
        }
        if claim_status != ClaimStatus::ReadyToSubmit {
            return Err(ClaimsError::invalid_transition(
                claim_status,
                ClaimStatus::InvoiceReady,
            ));
        }

        let claim = state.claim_mut(invoice.claim_id)?;
        claim.status = ClaimStatus::InvoiceReady;
        claim.updated_at = invoice.generated_at;
        state.invoices.insert(invoice.id, invoice.clone());
        state.record(audit.clone());
        Ok(())
    }

    async fn find_invoice(&self, invoice_id: Uuid) -> ClaimsResult<Option<Invoice>> {
        Ok(self.state.lock().invoices.get(&invoice_id).cloned())
    }

    async fn invoices_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<Invoice>> {
        let state = self.state.lock();
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.claim_id == claim_id)
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.revision);
        Ok(invoices)
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> ClaimsResult<Vec<Invoice>> {
        let state = self.state.lock();
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            b.generated_at
                .cmp(&a.generated_at)
                .then_with(|| b.invoice_number.cmp(&a.invoice_number))
        });
        Ok(page(invoices, filter.limit, filter.offset))
    }

    async fn mark_invoice_printed(
        &self,
        invoice_id: Uuid,
        printed_by: Uuid,
        printed_at: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> ClaimsResult<Invoice> {
        let mut state = self.state.lock();
        let invoice = state.invoice_mut(invoice_id)?;
        if invoice.status.is_locked() {
            return Err(ClaimsError::InvoiceLocked {
                invoice_number: invoice.invoice_number.clone(),
            });
        }
        invoice.status = InvoiceStatus::Printed;
        invoice.printed_by = Some(printed_by);
        invoice.printed_at = Some(printed_at);
        invoice.updated_at = printed_at;
        let updated = invoice.clone();
        state.record(audit.clone());
        Ok(updated)
    }

    async fn update_invoice(
        &self,
        invoice_id: Uuid,
        update: &InvoiceUpdate,
        audit: &AuditEntry,
    ) -> ClaimsResult<Invoice> {
        let mut state = self.state.lock();
        let invoice = state.invoice_mut(invoice_id)?;
        if invoice.status.is_locked() {
            return Err(ClaimsError::InvoiceLocked {
                invoice_number: invoice.invoice_number.clone(),
            });
        }
        update.apply(invoice);
        invoice.updated_at = Utc::now();
        let updated = invoice.clone();
        state.record(audit.clone());
        Ok(updated)
    }

    async fn create_batch(&self, batch: &Batch, selection: &BatchSelection) -> ClaimsResult<Batch> {
        let mut state = self.state.lock();
        if state
            .batches
            .values()
            .any(|b| b.batch_number == batch.batch_number)
        {
            return Err(unique_violation("sha_claim_batches_batch_number_key"));
        }

        let eligible = |c: &Claim| c.status == ClaimStatus::ReadyToSubmit && c.batch_id.is_none();
        let mut members: Vec<Uuid> = match selection {
            BatchSelection::Claims(ids) => ids
                .iter()
                .filter(|id| state.claims.get(*id).is_some_and(eligible))
                .copied()
                .collect(),
            BatchSelection::Window { start, end } => state
                .claims
                .values()
                .filter(|c| eligible(c) && c.created_at >= *start && c.created_at < *end)
                .map(|c| c.id)
                .collect(),
        };
        members.sort();
        members.dedup();
        if members.is_empty() {
            return Err(ClaimsError::NoEligibleClaims);
        }

        let mut created = batch.clone();
        created.total_claims = 0;
        created.total_amount = Decimal::ZERO;
        for claim_id in &members {
            let claim = state.claim_mut(*claim_id)?;
            claim.batch_id = Some(created.id);
            claim.updated_at = created.created_at;
            created.total_claims += 1;
            created.total_amount += claim.claim_amount;
        }
        for claim_id in &members {
            state.record(AuditEntry::new(
                *claim_id,
                created.created_by,
                AuditDetails::Batched {
                    batch_id: created.id,
                    batch_number: created.batch_number.clone(),
                },
            ));
        }
        state.batches.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_batch(&self, batch_id: Uuid) -> ClaimsResult<Option<Batch>> {
        Ok(self.state.lock().batches.get(&batch_id).cloned())
    }

    async fn list_batches(&self, status: Option<BatchStatus>) -> ClaimsResult<Vec<Batch>> {
        let state = self.state.lock();
        let mut batches: Vec<Batch> = state
            .batches
            .values()
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }

    async fn batch_claims(&self, batch_id: Uuid) -> ClaimsResult<Vec<Claim>> {
        let state = self.state.lock();
        let mut claims: Vec<Claim> = state
            .claims
            .values()
            .filter(|c| c.batch_id == Some(batch_id))
            .cloned()
            .collect();
        claims.sort_by(|a, b| a.claim_number.cmp(&b.claim_number));
        Ok(claims)
    }

    async fn delete_batch(&self, batch_id: Uuid, deleted_by: Uuid) -> ClaimsResult<Vec<Uuid>> {
        let mut state = self.state.lock();
        let batch = state
            .batches
            .get(&batch_id)
            .cloned()
            .ok_or_else(|| ClaimsError::not_found("Batch", batch_id))?;
        if batch.status != BatchStatus::Draft {
            return Err(ClaimsError::BatchNotDraft {
                batch_number: batch.batch_number,
                status: batch.status,
            });
        }

        let now = Utc::now();
        let mut released = Vec::new();
        for claim in state
            .claims
            .values_mut()
            .filter(|c| c.batch_id == Some(batch_id))
        {
            claim.batch_id = None;
            claim.updated_at = now;
            released.push(claim.id);
        }
        released.sort();
        for claim_id in &released {
            state.record(AuditEntry::new(
                *claim_id,
                deleted_by,
                AuditDetails::Unbatched {
                    batch_id,
                    batch_number: batch.batch_number.clone(),
                },
            ));
        }
        state.batches.remove(&batch_id);
        Ok(released)
    }

    async fn complete_batch(&self, batch_id: Uuid) -> ClaimsResult<bool> {
        let mut state = self.state.lock();
        let all_decided = state
            .claims
            .values()
            .filter(|c| c.batch_id == Some(batch_id))
            .all(|c| c.status.is_terminal_outcome());
        match state.batches.get_mut(&batch_id) {
            Some(batch) if batch.status == BatchStatus::Submitted && all_decided => {
                batch.status = BatchStatus::Completed;
                batch.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ClaimsError::not_found("Batch", batch_id)),
        }
    }

    async fn begin_submission(&self, log: &SubmissionLog) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        let in_flight = state.submissions.values().any(|existing| {
            existing.status == SubmissionStatus::Pending
                && existing.submission_type == log.submission_type
                && match log.submission_type {
                    SubmissionType::Single => existing.claim_id == log.claim_id,
                    SubmissionType::Batch => existing.batch_id == log.batch_id,
                }
        });
        if in_flight {
            let target = match (log.submission_type, log.claim_id, log.batch_id) {
                (SubmissionType::Single, Some(id), _) => SubmissionTarget::Claim(id).to_string(),
                (SubmissionType::Batch, _, Some(id)) => SubmissionTarget::Batch(id).to_string(),
                _ => log.id.to_string(),
            };
            return Err(ClaimsError::SubmissionInProgress { target });
        }
        state.submissions.insert(log.id, log.clone());
        Ok(())
    }

    async fn previous_attempts(&self, target: SubmissionTarget) -> ClaimsResult<i32> {
        let state = self.state.lock();
        let count = state
            .submissions
            .values()
            .filter(|log| match target {
                SubmissionTarget::Claim(id) => {
                    log.submission_type == SubmissionType::Single && log.claim_id == Some(id)
                }
                SubmissionTarget::Batch(id) => {
                    log.submission_type == SubmissionType::Batch && log.batch_id == Some(id)
                }
            })
            .count();
        Ok(i32::try_from(count).unwrap_or(i32::MAX))
    }

    async fn fail_submission(&self, failure: &SubmissionFailure) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        state.pending_log(failure.log_id)?;
        state.finish_log(
            failure.log_id,
            SubmissionStatus::Failed,
            failure.response_payload.clone(),
            Some(failure.error_message.clone()),
            failure.completed_at,
        );
        for entry in &failure.audits {
            state.record(entry.clone());
        }
        Ok(())
    }

    async fn complete_claim_submission(
        &self,
        outcome: &ClaimSubmissionOutcome,
    ) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        state.pending_log(outcome.log_id)?;
        state.check_lockable(outcome.claim_id, outcome.invoice_id)?;

        state.finish_log(
            outcome.log_id,
            SubmissionStatus::Success,
            Some(outcome.response_payload.clone()),
            None,
            outcome.submitted_at,
        );
        state.lock_claim_and_invoice(
            outcome.claim_id,
            outcome.invoice_id,
            &outcome.sha_reference,
            outcome.submitted_by,
            outcome.submitted_at,
        );
        state.record(outcome.audit.clone());
        Ok(())
    }

    async fn complete_batch_submission(
        &self,
        outcome: &BatchSubmissionOutcome,
    ) -> ClaimsResult<()> {
        let mut state = self.state.lock();
        state.pending_log(outcome.log_id)?;
        let batch = state
            .batches
            .get(&outcome.batch_id)
            .ok_or_else(|| ClaimsError::not_found("Batch", outcome.batch_id))?;
        if batch.status != BatchStatus::Draft {
            return Err(ClaimsError::BatchNotDraft {
                batch_number: batch.batch_number.clone(),
                status: batch.status,
            });
        }
        for member in &outcome.claims {
            state.check_lockable(member.claim_id, member.invoice_id)?;
        }

        state.finish_log(
            outcome.log_id,
            SubmissionStatus::Success,
            Some(outcome.response_payload.clone()),
            None,
            outcome.submitted_at,
        );
        if let Some(batch) = state.batches.get_mut(&outcome.batch_id) {
            batch.status = BatchStatus::Submitted;
            batch.sha_batch_reference = Some(outcome.sha_batch_reference.clone());
            batch.submitted_by = Some(outcome.submitted_by);
            batch.submitted_at = Some(outcome.submitted_at);
            batch.updated_at = outcome.submitted_at;
        }
        for member in &outcome.claims {
            state.lock_claim_and_invoice(
                member.claim_id,
                member.invoice_id,
                &member.sha_reference,
                outcome.submitted_by,
                outcome.submitted_at,
            );
            state.record(member.audit.clone());
        }
        Ok(())
    }

    async fn find_submission_log(&self, log_id: Uuid) -> ClaimsResult<Option<SubmissionLog>> {
        Ok(self.state.lock().submissions.get(&log_id).cloned())
    }

    async fn submission_logs_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<SubmissionLog>> {
        let state = self.state.lock();
        let batch_id = state.claims.get(&claim_id).and_then(|c| c.batch_id);
        let mut logs: Vec<SubmissionLog> = state
            .submissions
            .values()
            .filter(|log| {
                log.claim_id == Some(claim_id) || (batch_id.is_some() && log.batch_id == batch_id)
            })
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(logs)
    }

    async fn stale_pending_submissions(
        &self,
        created_before: DateTime<Utc>,
    ) -> ClaimsResult<Vec<SubmissionLog>> {
        let state = self.state.lock();
        let mut logs: Vec<SubmissionLog> = state
            .submissions
            .values()
            .filter(|log| log.status == SubmissionStatus::Pending && log.created_at < created_before)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.created_at);
        Ok(logs)
    }

    async fn claims_awaiting_outcome(&self) -> ClaimsResult<Vec<Claim>> {
        let state = self.state.lock();
        let mut claims: Vec<Claim> = state
            .claims
            .values()
            .filter(|c| {
                matches!(c.status, ClaimStatus::Submitted | ClaimStatus::Approved)
                    && c.sha_reference.is_some()
            })
            .cloned()
            .collect();
        claims.sort_by_key(|c| c.submission_date);
        Ok(claims)
    }

    async fn apply_remote_status(&self, update: &RemoteStatusUpdate) -> ClaimsResult<bool> {
        let mut state = self.state.lock();
        let claim = state.claim_mut(update.claim_id)?;
        if claim.status != update.from {
            return Ok(false);
        }
        claim.status = update.to;
        if update.approved_amount.is_some() {
            claim.approved_amount = update.approved_amount;
        }
        if update.approval_date.is_some() {
            claim.approval_date = update.approval_date;
        }
        if update.rejection_reason.is_some() {
            claim.rejection_reason = update.rejection_reason.clone();
        }
        claim.updated_at = Utc::now();
        state.record(update.audit.clone());
        Ok(true)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> ClaimsResult<()> {
        self.state.lock().record(entry.clone());
        Ok(())
    }

    async fn audit_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<AuditEntry>> {
        let state = self.state.lock();
        let mut entries: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| e.claim_id == claim_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.performed_at);
        Ok(entries)
    }

    async fn audit_for_invoice(&self, invoice_id: Uuid) -> ClaimsResult<Vec<AuditEntry>> {
        let state = self.state.lock();
        let mut entries: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| e.invoice_id == Some(invoice_id))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.performed_at);
        Ok(entries)
    }
}
