use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CLAIMS
// ============================================================================

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    ReadyToSubmit,
    InvoiceReady,
    Submitted,
    Approved,
    Rejected,
    Paid,
}

database_layer::text_enum!(ClaimStatus {
    Draft => "draft",
    ReadyToSubmit => "ready_to_submit",
    InvoiceReady => "invoice_ready",
    Submitted => "submitted",
    Approved => "approved",
    Rejected => "rejected",
    Paid => "paid",
});

/// Who is driving a status change. Some edges belong to exactly one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDriver {
    /// A user acting through the claim API
    Manual,
    /// Successful invoice generation
    InvoiceGeneration,
    /// Successful insurer submission
    Submission,
    /// Reconciliation against the insurer's remote status
    Reconciliation,
}

impl ClaimStatus {
    /// Whether `self -> to` is a legal edge for the given driver
    pub fn allows(self, to: ClaimStatus, driver: TransitionDriver) -> bool {
        use ClaimStatus::{Approved, Draft, InvoiceReady, Paid, ReadyToSubmit, Rejected, Submitted};
        use TransitionDriver::{InvoiceGeneration, Manual, Reconciliation, Submission};

        match (self, to) {
            (Draft, ReadyToSubmit) | (Rejected, ReadyToSubmit) => driver == Manual,
            (ReadyToSubmit, InvoiceReady) => driver == InvoiceGeneration,
            (InvoiceReady, Submitted) => driver == Submission,
            (Submitted, Approved | Rejected | Paid) | (Approved, Paid) => {
                matches!(driver, Reconciliation | Manual)
            }
            _ => false,
        }
    }

    /// Insurer has decided the claim
    pub fn is_terminal_outcome(self) -> bool {
        matches!(
            self,
            ClaimStatus::Approved | ClaimStatus::Rejected | ClaimStatus::Paid
        )
    }

    /// Claim has reached the insurer and its record is retained permanently
    pub fn is_submitted_or_later(self) -> bool {
        matches!(self, ClaimStatus::Submitted) || self.is_terminal_outcome()
    }
}

/// Compliance review state shared by claims and invoices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

database_layer::text_enum!(ComplianceStatus {
    Pending => "pending",
    Verified => "verified",
    Rejected => "rejected",
});

/// ICD-10 diagnosis with its description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub code: String,
    pub description: String,
}

/// Insurance claim for one patient encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub claim_number: String,
    pub patient_id: Uuid,
    pub visit_id: Uuid,
    pub op_number: String,
    pub member_number: String,
    pub visit_date: NaiveDate,
    pub primary_diagnosis: Diagnosis,
    pub secondary_diagnoses: Vec<Diagnosis>,
    pub provider_code: String,
    pub claim_amount: Decimal,
    pub status: ClaimStatus,
    pub compliance_status: ComplianceStatus,
    pub batch_id: Option<Uuid>,
    pub sha_reference: Option<String>,
    pub submission_date: Option<DateTime<Utc>>,
    pub approved_amount: Option<Decimal>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One billable line on a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClaimItem {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub service_type: String,
    pub service_code: String,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub provided_by: Option<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Encounter data used to open a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaim {
    pub patient_id: Uuid,
    pub visit_id: Uuid,
    pub op_number: String,
    pub member_number: String,
    pub visit_date: NaiveDate,
    pub primary_diagnosis: Diagnosis,
    #[serde(default)]
    pub secondary_diagnoses: Vec<Diagnosis>,
    pub items: Vec<NewClaimItem>,
    pub notes: Option<String>,
    /// Open the claim as `draft` instead of `ready_to_submit`
    #[serde(default)]
    pub draft: bool,
}

/// Line item as supplied by the encounter; totals are computed server-side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaimItem {
    pub service_type: String,
    pub service_code: Option<String>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub provided_by: Option<String>,
    pub department: Option<String>,
}

/// Claim together with its line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDetail {
    #[serde(flatten)]
    pub claim: Claim,
    pub items: Vec<ClaimItem>,
}

/// Claim listing filters
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub status: Option<ClaimStatus>,
    pub batch_id: Option<Uuid>,
    pub unbatched_only: bool,
    pub op_number: Option<String>,
    pub member_number: Option<String>,
    pub visit_from: Option<NaiveDate>,
    pub visit_to: Option<NaiveDate>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Case-insensitive match on claim number or op number
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ClaimFilter {
    pub fn matches(&self, claim: &Claim) -> bool {
        if self.status.is_some_and(|s| s != claim.status) {
            return false;
        }
        if self.batch_id.is_some() && self.batch_id != claim.batch_id {
            return false;
        }
        if self.unbatched_only && claim.batch_id.is_some() {
            return false;
        }
        if self.op_number.as_deref().is_some_and(|op| op != claim.op_number) {
            return false;
        }
        if self
            .member_number
            .as_deref()
            .is_some_and(|m| m != claim.member_number)
        {
            return false;
        }
        if self.visit_from.is_some_and(|d| claim.visit_date < d)
            || self.visit_to.is_some_and(|d| claim.visit_date > d)
        {
            return false;
        }
        if self.created_from.is_some_and(|t| claim.created_at < t)
            || self.created_before.is_some_and(|t| claim.created_at >= t)
        {
            return false;
        }
        if let Some(term) = self.search.as_deref() {
            let term = term.to_lowercase();
            if !claim.claim_number.to_lowercase().contains(&term)
                && !claim.op_number.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// INVOICES
// ============================================================================

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Generated,
    Printed,
    Submitted,
}

database_layer::text_enum!(InvoiceStatus {
    Generated => "generated",
    Printed => "printed",
    Submitted => "submitted",
});

impl InvoiceStatus {
    /// Submitted invoices are read-only
    pub fn is_locked(self) -> bool {
        self == InvoiceStatus::Submitted
    }
}

/// Clinic-facing pre-submission invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub claim_id: Uuid,
    /// 1 for the first invoice; resubmissions after rejection add revisions
    pub revision: i32,
    pub patient_id: Uuid,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub status: InvoiceStatus,
    pub compliance_status: ComplianceStatus,
    pub notes: Option<String>,
    pub generated_by: Uuid,
    pub generated_at: DateTime<Utc>,
    pub printed_by: Option<Uuid>,
    pub printed_at: Option<DateTime<Utc>>,
    pub submitted_by: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub sha_reference: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Editable invoice fields before submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl InvoiceUpdate {
    pub fn changed_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.due_date.is_some() {
            fields.push("due_date".to_string());
        }
        if self.notes.is_some() {
            fields.push("notes".to_string());
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.due_date.is_none() && self.notes.is_none()
    }

    pub fn apply(&self, invoice: &mut Invoice) {
        if let Some(due_date) = self.due_date {
            invoice.due_date = due_date;
        }
        if let Some(notes) = &self.notes {
            invoice.notes = Some(notes.clone());
        }
    }
}

/// Invoice listing filters
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    /// Empty means any status
    pub statuses: Vec<InvoiceStatus>,
    pub claim_id: Option<Uuid>,
    pub invoice_from: Option<NaiveDate>,
    pub invoice_to: Option<NaiveDate>,
    pub submitted_from: Option<DateTime<Utc>>,
    pub submitted_before: Option<DateTime<Utc>>,
    /// Case-insensitive match on invoice number
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&invoice.status) {
            return false;
        }
        if self.claim_id.is_some_and(|id| id != invoice.claim_id) {
            return false;
        }
        if self.invoice_from.is_some_and(|d| invoice.invoice_date < d)
            || self.invoice_to.is_some_and(|d| invoice.invoice_date > d)
        {
            return false;
        }
        if self.submitted_from.is_some() || self.submitted_before.is_some() {
            let Some(submitted_at) = invoice.submitted_at else {
                return false;
            };
            if self.submitted_from.is_some_and(|t| submitted_at < t)
                || self.submitted_before.is_some_and(|t| submitted_at >= t)
            {
                return false;
            }
        }
        if let Some(term) = self.search.as_deref() {
            if !invoice
                .invoice_number
                .to_lowercase()
                .contains(&term.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// BATCHES
// ============================================================================

/// Batch selection window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    Weekly,
    Monthly,
    Custom,
}

database_layer::text_enum!(BatchType {
    Weekly => "weekly",
    Monthly => "monthly",
    Custom => "custom",
});

/// Batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    Submitted,
    Completed,
}

database_layer::text_enum!(BatchStatus {
    Draft => "draft",
    Submitted => "submitted",
    Completed => "completed",
});

/// Claims submitted together in one insurer call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub batch_number: String,
    pub batch_date: NaiveDate,
    pub batch_type: BatchType,
    pub total_claims: i32,
    pub total_amount: Decimal,
    pub status: BatchStatus,
    pub sha_batch_reference: Option<String>,
    pub submitted_by: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Batch with its member claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDetail {
    #[serde(flatten)]
    pub batch: Batch,
    pub claims: Vec<Claim>,
}

/// Batch creation request: explicit claim ids, an explicit date range, or the
/// window implied by `batch_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub batch_type: BatchType,
    pub batch_date: Option<NaiveDate>,
    #[serde(default)]
    pub claim_ids: Vec<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

// ============================================================================
// SUBMISSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Single,
    Batch,
}

database_layer::text_enum!(SubmissionType {
    Single => "single",
    Batch => "batch",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Success,
    Failed,
}

database_layer::text_enum!(SubmissionStatus {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
});

/// One insurer submission attempt, written before the external call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionLog {
    pub id: Uuid,
    pub claim_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub submission_type: SubmissionType,
    pub request_payload: serde_json::Value,
    pub response_payload: Option<serde_json::Value>,
    pub status: SubmissionStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub submitted_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SubmissionLog {
    /// Fresh `pending` attempt for a single claim
    pub fn pending_for_claim(
        claim_id: Uuid,
        invoice_id: Uuid,
        request_payload: serde_json::Value,
        retry_count: i32,
        submitted_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            claim_id: Some(claim_id),
            batch_id: None,
            invoice_id: Some(invoice_id),
            submission_type: SubmissionType::Single,
            request_payload,
            response_payload: None,
            status: SubmissionStatus::Pending,
            retry_count,
            error_message: None,
            submitted_by,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Fresh `pending` attempt for a batch
    pub fn pending_for_batch(
        batch_id: Uuid,
        request_payload: serde_json::Value,
        retry_count: i32,
        submitted_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            claim_id: None,
            batch_id: Some(batch_id),
            invoice_id: None,
            submission_type: SubmissionType::Batch,
            request_payload,
            response_payload: None,
            status: SubmissionStatus::Pending,
            retry_count,
            error_message: None,
            submitted_by,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// What a submission attempt targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionTarget {
    Claim(Uuid),
    Batch(Uuid),
}

impl std::fmt::Display for SubmissionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionTarget::Claim(id) => write!(f, "claim {id}"),
            SubmissionTarget::Batch(id) => write!(f, "batch {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClaimStatus::*;
    use TransitionDriver::*;

    #[test]
    fn test_invoice_and_submission_edges_are_exclusive() {
        assert!(ReadyToSubmit.allows(InvoiceReady, InvoiceGeneration));
        assert!(!ReadyToSubmit.allows(InvoiceReady, Manual));
        assert!(InvoiceReady.allows(Submitted, Submission));
        assert!(!InvoiceReady.allows(Submitted, Manual));
        assert!(!InvoiceReady.allows(Submitted, Reconciliation));
    }

    #[test]
    fn test_status_never_regresses_except_resubmission() {
        for from in [Submitted, Approved, Paid, InvoiceReady] {
            for driver in [Manual, InvoiceGeneration, Submission, Reconciliation] {
                assert!(!from.allows(ReadyToSubmit, driver), "{from} -> ready_to_submit");
                assert!(!from.allows(Draft, driver));
            }
        }
        assert!(Rejected.allows(ReadyToSubmit, Manual));
        assert!(!Rejected.allows(ReadyToSubmit, Reconciliation));
    }

    #[test]
    fn test_outcomes_move_forward_only() {
        assert!(Submitted.allows(Approved, Reconciliation));
        assert!(Submitted.allows(Rejected, Reconciliation));
        assert!(Submitted.allows(Paid, Reconciliation));
        assert!(Approved.allows(Paid, Reconciliation));
        assert!(!Approved.allows(Rejected, Reconciliation));
        assert!(!Paid.allows(Approved, Reconciliation));
        assert!(!Approved.allows(Submitted, Manual));
    }

    #[test]
    fn test_invoice_update_fields() {
        let update = InvoiceUpdate {
            due_date: None,
            notes: Some("Reprinted for records".into()),
        };
        assert_eq!(update.changed_fields(), vec!["notes".to_string()]);
        assert!(!update.is_empty());
        assert!(InvoiceUpdate::default().is_empty());
    }

    #[test]
    fn test_status_serde_matches_column_text() {
        let json = serde_json::to_string(&ClaimStatus::ReadyToSubmit).unwrap();
        assert_eq!(json, format!("\"{}\"", ClaimStatus::ReadyToSubmit.as_str()));
        let parsed: InvoiceStatus = serde_json::from_str("\"printed\"").unwrap();
        assert_eq!(parsed, InvoiceStatus::Printed);
    }
}
