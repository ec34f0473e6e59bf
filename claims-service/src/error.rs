use audit_engine::AuditError;
use database_layer::{DatabaseError, UnknownVariant};
use thiserror::Error;
use uuid::Uuid;

use crate::models::BatchStatus;

#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("An invoice already exists for claim {claim_id}")]
    DuplicateInvoice { claim_id: Uuid },

    #[error("No eligible claims found for batch creation")]
    NoEligibleClaims,

    #[error("Invoice not ready for submission: {0}")]
    InvoiceNotReady(String),

    #[error("Invoice {invoice_number} is locked after submission")]
    InvoiceLocked { invoice_number: String },

    #[error("Batch {batch_number} is {status}; only draft batches can be changed")]
    BatchNotDraft {
        batch_number: String,
        status: BatchStatus,
    },

    #[error("A submission is already in progress for {target}")]
    SubmissionInProgress { target: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Audit record error: {0}")]
    Audit(#[from] AuditError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),
}

impl ClaimsError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Business-rule violations the caller can correct; everything else is a server fault
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            ClaimsError::Export(_) | ClaimsError::Audit(_) | ClaimsError::Persistence(_)
        )
    }
}

impl From<sqlx::Error> for ClaimsError {
    fn from(err: sqlx::Error) -> Self {
        ClaimsError::Persistence(err.into())
    }
}

impl From<csv::Error> for ClaimsError {
    fn from(err: csv::Error) -> Self {
        ClaimsError::Export(err.to_string())
    }
}

impl From<UnknownVariant> for ClaimsError {
    fn from(err: UnknownVariant) -> Self {
        ClaimsError::Persistence(err.into())
    }
}

pub type ClaimsResult<T> = Result<T, ClaimsError>;
