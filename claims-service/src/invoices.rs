use std::sync::Arc;

use audit_engine::{AuditDetails, AuditEntry};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batches::{start_of_day, window_start};
use crate::compliance::ComplianceReport;
use crate::error::{ClaimsError, ClaimsResult};
use crate::models::{
    BatchType, Claim, ClaimStatus, Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate,
};
use crate::numbering::NumberScope;
use crate::repository::ClaimsRepository;

pub const DEFAULT_PAYMENT_TERMS_DAYS: i64 = 30;

/// A member claim whose invoice could not be generated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceFailure {
    pub claim_id: Uuid,
    pub claim_number: String,
    pub error: String,
}

/// Outcome of generating invoices for every ready claim in a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchInvoiceResult {
    pub generated: Vec<Invoice>,
    pub failed: Vec<InvoiceFailure>,
}

/// Invoice Generator: one open pre-submission invoice per claim
#[derive(Clone)]
pub struct InvoiceGenerator {
    repo: Arc<dyn ClaimsRepository>,
    payment_terms_days: i64,
}

impl InvoiceGenerator {
    pub fn new(repo: Arc<dyn ClaimsRepository>, payment_terms_days: i64) -> Self {
        Self {
            repo,
            payment_terms_days,
        }
    }

    /// Generate the pre-submission invoice for a `ready_to_submit` claim
    ///
    /// A claim that already has an open invoice, or that was invoiced and has
    /// moved on, fails with `DuplicateInvoice`. A concurrent duplicate that
    /// slips past the read is rejected by the open-invoice constraint.
    pub async fn generate_invoice(&self, claim_id: Uuid, generated_by: Uuid) -> ClaimsResult<Invoice> {
        let claim = self.find_claim(claim_id).await?;
        let existing = self.repo.invoices_for_claim(claim_id).await?;

        if existing.iter().any(|i| !i.status.is_locked()) {
            return Err(ClaimsError::DuplicateInvoice { claim_id });
        }
        if claim.status != ClaimStatus::ReadyToSubmit {
            if existing.is_empty() {
                return Err(ClaimsError::invalid_transition(
                    claim.status,
                    ClaimStatus::InvoiceReady,
                ));
            }
            return Err(ClaimsError::DuplicateInvoice { claim_id });
        }

        let revision = existing.last().map_or(1, |last| last.revision + 1);
        let items = self.repo.claim_items(claim_id).await?;

        let now = Utc::now();
        let invoice_date = now.date_naive();
        let scope = NumberScope::Invoice;
        let period = scope.period(invoice_date);
        let seq = self.repo.next_sequence(scope, &period).await?;

        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: scope.format(&period, seq),
            claim_id,
            revision,
            patient_id: claim.patient_id,
            invoice_date,
            due_date: invoice_date + Duration::days(self.payment_terms_days),
            total_amount: claim.claim_amount,
            status: InvoiceStatus::Generated,
            compliance_status: claim.compliance_status,
            notes: None,
            generated_by,
            generated_at: now,
            printed_by: None,
            printed_at: None,
            submitted_by: None,
            submitted_at: None,
            sha_reference: None,
            updated_at: now,
        };

        let audit = AuditEntry::new(
            claim_id,
            generated_by,
            AuditDetails::InvoiceGenerated {
                invoice_number: invoice.invoice_number.clone(),
                amount: invoice.total_amount,
                item_count: items.len(),
                revision,
            },
        )
        .for_invoice(invoice.id)
        .at(now);
        self.repo.insert_invoice(&invoice, &audit).await?;

        tracing::info!(
            claim_id = %claim_id,
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            revision,
            amount = %invoice.total_amount,
            "Pre-submission invoice generated"
        );
        Ok(invoice)
    }

    /// Generate invoices for every batch member still in `ready_to_submit`
    pub async fn generate_for_batch(
        &self,
        batch_id: Uuid,
        generated_by: Uuid,
    ) -> ClaimsResult<BatchInvoiceResult> {
        if self.repo.find_batch(batch_id).await?.is_none() {
            return Err(ClaimsError::not_found("Batch", batch_id));
        }

        let mut result = BatchInvoiceResult::default();
        for claim in self.repo.batch_claims(batch_id).await? {
            if claim.status != ClaimStatus::ReadyToSubmit {
                continue;
            }
            match self.generate_invoice(claim.id, generated_by).await {
                Ok(invoice) => result.generated.push(invoice),
                Err(e) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        claim_id = %claim.id,
                        error = %e,
                        "Batch invoice generation failed for claim"
                    );
                    result.failed.push(InvoiceFailure {
                        claim_id: claim.id,
                        claim_number: claim.claim_number,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Record a print of an open invoice; reprints update the print stamp
    pub async fn mark_printed(&self, invoice_id: Uuid, printed_by: Uuid) -> ClaimsResult<Invoice> {
        let invoice = self.get_invoice(invoice_id).await?;
        if invoice.status.is_locked() {
            return Err(ClaimsError::InvoiceLocked {
                invoice_number: invoice.invoice_number,
            });
        }

        let now = Utc::now();
        let audit = AuditEntry::new(
            invoice.claim_id,
            printed_by,
            AuditDetails::InvoicePrinted {
                invoice_number: invoice.invoice_number.clone(),
            },
        )
        .for_invoice(invoice_id)
        .at(now);
        let printed = self
            .repo
            .mark_invoice_printed(invoice_id, printed_by, now, &audit)
            .await?;

        tracing::info!(invoice_id = %invoice_id, invoice_number = %printed.invoice_number, "Invoice printed");
        Ok(printed)
    }

    /// Edit due date or notes before submission
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        update: InvoiceUpdate,
        updated_by: Uuid,
    ) -> ClaimsResult<Invoice> {
        if update.is_empty() {
            return Err(ClaimsError::Validation("No invoice fields to update".into()));
        }
        let invoice = self.get_invoice(invoice_id).await?;
        if invoice.status.is_locked() {
            return Err(ClaimsError::InvoiceLocked {
                invoice_number: invoice.invoice_number,
            });
        }
        if update.due_date.is_some_and(|due| due < invoice.invoice_date) {
            return Err(ClaimsError::Validation(
                "Due date cannot precede the invoice date".into(),
            ));
        }

        let audit = AuditEntry::new(
            invoice.claim_id,
            updated_by,
            AuditDetails::InvoiceUpdated {
                invoice_number: invoice.invoice_number.clone(),
                fields: update.changed_fields(),
            },
        )
        .for_invoice(invoice_id);
        self.repo.update_invoice(invoice_id, &update, &audit).await
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> ClaimsResult<Invoice> {
        self.repo
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Invoice", invoice_id))
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> ClaimsResult<Vec<Invoice>> {
        self.repo.list_invoices(filter).await
    }

    /// The claim's invoice that is not yet submitted, if any
    pub async fn open_invoice_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Option<Invoice>> {
        let invoices = self.repo.invoices_for_claim(claim_id).await?;
        Ok(invoices.into_iter().find(|i| !i.status.is_locked()))
    }

    /// Generated or printed invoices awaiting review before submission
    pub async fn ready_for_review(&self) -> ClaimsResult<Vec<Invoice>> {
        self.repo
            .list_invoices(&InvoiceFilter {
                statuses: vec![InvoiceStatus::Generated, InvoiceStatus::Printed],
                ..InvoiceFilter::default()
            })
            .await
    }

    /// Submitted invoices, optionally limited to a submission date range
    pub async fn submitted_archive(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ClaimsResult<Vec<Invoice>> {
        self.repo
            .list_invoices(&InvoiceFilter {
                statuses: vec![InvoiceStatus::Submitted],
                submitted_from: start_date.map(start_of_day),
                submitted_before: end_date.map(|d| start_of_day(d + Duration::days(1))),
                ..InvoiceFilter::default()
            })
            .await
    }

    /// Generated invoices dated within the current week or month
    pub async fn ready_for_printing(&self, period: BatchType) -> ClaimsResult<Vec<Invoice>> {
        let today = Utc::now().date_naive();
        self.repo
            .list_invoices(&InvoiceFilter {
                statuses: vec![InvoiceStatus::Generated],
                invoice_from: Some(window_start(period, today)),
                invoice_to: Some(today),
                ..InvoiceFilter::default()
            })
            .await
    }

    pub async fn audit_trail(&self, invoice_id: Uuid) -> ClaimsResult<Vec<AuditEntry>> {
        self.get_invoice(invoice_id).await?;
        self.repo.audit_for_invoice(invoice_id).await
    }

    /// Invoice counts and totals for invoices dated in the range, plus the
    /// claims behind them that fail the compliance checklist
    pub async fn compliance_report(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ClaimsResult<ComplianceReport> {
        let invoices = self
            .repo
            .list_invoices(&InvoiceFilter {
                invoice_from: start_date,
                invoice_to: end_date,
                ..InvoiceFilter::default()
            })
            .await?;

        let mut claim_ids: Vec<Uuid> = invoices.iter().map(|i| i.claim_id).collect();
        claim_ids.sort();
        claim_ids.dedup();
        let mut claims: Vec<Claim> = Vec::with_capacity(claim_ids.len());
        for claim_id in claim_ids {
            if let Some(claim) = self.repo.find_claim(claim_id).await? {
                claims.push(claim);
            }
        }

        Ok(ComplianceReport::build(
            start_date,
            end_date,
            &invoices,
            &claims,
            Utc::now().date_naive(),
        ))
    }

    async fn find_claim(&self, claim_id: Uuid) -> ClaimsResult<Claim> {
        self.repo
            .find_claim(claim_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Claim", claim_id))
    }
}
