// Audit entry types and structures
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Actor recorded for actions the system takes on its own (reconciliation, automation)
pub const SYSTEM_ACTOR: Uuid = Uuid::nil();

/// Closed set of audited actions on claims and invoices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ClaimCreated,
    ClaimStatusChanged,
    ClaimDeleted,
    ClaimBatched,
    ClaimUnbatched,
    ComplianceVerified,
    InvoiceGeneratedPreSubmission,
    InvoicePrinted,
    InvoiceUpdated,
    ClaimSubmittedToSha,
    SubmissionFailed,
    ClaimStatusReconciled,
}

database_layer::text_enum!(AuditAction {
    ClaimCreated => "CLAIM_CREATED",
    ClaimStatusChanged => "CLAIM_STATUS_CHANGED",
    ClaimDeleted => "CLAIM_DELETED",
    ClaimBatched => "CLAIM_BATCHED",
    ClaimUnbatched => "CLAIM_UNBATCHED",
    ComplianceVerified => "COMPLIANCE_VERIFIED",
    InvoiceGeneratedPreSubmission => "INVOICE_GENERATED_PRE_SUBMISSION",
    InvoicePrinted => "INVOICE_PRINTED",
    InvoiceUpdated => "INVOICE_UPDATED",
    ClaimSubmittedToSha => "CLAIM_SUBMITTED_TO_SHA",
    SubmissionFailed => "SUBMISSION_FAILED",
    ClaimStatusReconciled => "CLAIM_STATUS_RECONCILED",
});

impl AuditAction {
    /// Actions that feed the insurer compliance record
    pub fn is_compliance_relevant(self) -> bool {
        matches!(
            self,
            AuditAction::ComplianceVerified
                | AuditAction::InvoiceGeneratedPreSubmission
                | AuditAction::InvoicePrinted
                | AuditAction::ClaimSubmittedToSha
                | AuditAction::SubmissionFailed
                | AuditAction::ClaimStatusReconciled
        )
    }
}

/// Typed payload attached to an audit entry, one variant per action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditDetails {
    ClaimCreated {
        claim_number: String,
        claim_amount: Decimal,
        item_count: usize,
    },
    StatusChanged {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ClaimDeleted {
        claim_number: String,
    },
    Batched {
        batch_id: Uuid,
        batch_number: String,
    },
    Unbatched {
        batch_id: Uuid,
        batch_number: String,
    },
    ComplianceVerified {
        status: String,
        issues: Vec<String>,
    },
    InvoiceGenerated {
        invoice_number: String,
        amount: Decimal,
        item_count: usize,
        revision: i32,
    },
    InvoicePrinted {
        invoice_number: String,
    },
    InvoiceUpdated {
        invoice_number: String,
        fields: Vec<String>,
    },
    ClaimSubmitted {
        invoice_number: String,
        sha_reference: String,
        submission_log_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_number: Option<String>,
        invoice_locked: bool,
    },
    SubmissionFailed {
        submission_log_id: Uuid,
        error: String,
    },
    StatusReconciled {
        from: String,
        to: String,
        remote_status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approved_amount: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejection_reason: Option<String>,
    },
}

impl AuditDetails {
    /// The action this payload documents
    pub fn action(&self) -> AuditAction {
        match self {
            AuditDetails::ClaimCreated { .. } => AuditAction::ClaimCreated,
            AuditDetails::StatusChanged { .. } => AuditAction::ClaimStatusChanged,
            AuditDetails::ClaimDeleted { .. } => AuditAction::ClaimDeleted,
            AuditDetails::Batched { .. } => AuditAction::ClaimBatched,
            AuditDetails::Unbatched { .. } => AuditAction::ClaimUnbatched,
            AuditDetails::ComplianceVerified { .. } => AuditAction::ComplianceVerified,
            AuditDetails::InvoiceGenerated { .. } => AuditAction::InvoiceGeneratedPreSubmission,
            AuditDetails::InvoicePrinted { .. } => AuditAction::InvoicePrinted,
            AuditDetails::InvoiceUpdated { .. } => AuditAction::InvoiceUpdated,
            AuditDetails::ClaimSubmitted { .. } => AuditAction::ClaimSubmittedToSha,
            AuditDetails::SubmissionFailed { .. } => AuditAction::SubmissionFailed,
            AuditDetails::StatusReconciled { .. } => AuditAction::ClaimStatusReconciled,
        }
    }
}

/// Immutable audit record for one state-changing action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub action: AuditAction,
    pub performed_by: Uuid,
    pub performed_at: DateTime<Utc>,
    pub details: AuditDetails,
    pub compliance_check: bool,
}

impl AuditEntry {
    pub fn new(claim_id: Uuid, performed_by: Uuid, details: AuditDetails) -> Self {
        let action = details.action();
        Self {
            id: Uuid::new_v4(),
            claim_id,
            invoice_id: None,
            action,
            performed_by,
            performed_at: Utc::now(),
            details,
            compliance_check: action.is_compliance_relevant(),
        }
    }

    /// Attach the invoice this action touched
    #[must_use]
    pub fn for_invoice(mut self, invoice_id: Uuid) -> Self {
        self.invoice_id = Some(invoice_id);
        self
    }

    #[must_use]
    pub fn at(mut self, performed_at: DateTime<Utc>) -> Self {
        self.performed_at = performed_at;
        self
    }

    /// Details as the JSON document stored in `sha_audit_trail.details`
    pub fn details_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.details)?)
    }

    /// Rebuild an entry from its stored columns
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        id: Uuid,
        claim_id: Uuid,
        invoice_id: Option<Uuid>,
        action: &str,
        performed_by: Uuid,
        performed_at: DateTime<Utc>,
        details: serde_json::Value,
        compliance_check: bool,
    ) -> Result<Self> {
        Ok(Self {
            id,
            claim_id,
            invoice_id,
            action: action.parse()?,
            performed_by,
            performed_at,
            details: serde_json::from_value(details)?,
            compliance_check,
        })
    }

    /// Emit the entry on the `audit` tracing target
    pub fn trace(&self) {
        tracing::info!(
            target: "audit",
            audit_id = %self.id,
            claim_id = %self.claim_id,
            invoice_id = ?self.invoice_id,
            action = %self.action,
            performed_by = %self.performed_by,
            compliance_check = self.compliance_check,
            "Audit entry recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_action_is_derived_from_details() {
        let claim_id = Uuid::new_v4();
        let entry = AuditEntry::new(
            claim_id,
            Uuid::new_v4(),
            AuditDetails::InvoiceGenerated {
                invoice_number: "SHA-202406-000001".into(),
                amount: Decimal::new(8000, 2),
                item_count: 2,
                revision: 1,
            },
        );
        assert_eq!(entry.action, AuditAction::InvoiceGeneratedPreSubmission);
        assert!(entry.compliance_check);
        assert_eq!(entry.claim_id, claim_id);
        assert!(entry.invoice_id.is_none());
    }

    #[test]
    fn test_status_change_is_not_compliance_flagged() {
        let entry = AuditEntry::new(
            Uuid::new_v4(),
            SYSTEM_ACTOR,
            AuditDetails::StatusChanged {
                from: "draft".into(),
                to: "ready_to_submit".into(),
                reason: None,
            },
        );
        assert_eq!(entry.action, AuditAction::ClaimStatusChanged);
        assert!(!entry.compliance_check);
    }

    #[test]
    fn test_details_are_tagged_in_json() {
        let details = AuditDetails::ClaimSubmitted {
            invoice_number: "SHA-202406-000003".into(),
            sha_reference: "SHA-REF-42".into(),
            submission_log_id: Uuid::nil(),
            batch_number: None,
            invoice_locked: true,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "claim_submitted");
        assert_eq!(json["invoice_locked"], true);
        assert!(json.get("batch_number").is_none());
    }

    #[test]
    fn test_from_stored_restores_entry() {
        let original = AuditEntry::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            AuditDetails::InvoicePrinted {
                invoice_number: "SHA-202406-000002".into(),
            },
        )
        .for_invoice(Uuid::new_v4());

        let restored = AuditEntry::from_stored(
            original.id,
            original.claim_id,
            original.invoice_id,
            original.action.as_str(),
            original.performed_by,
            original.performed_at,
            original.details_json().unwrap(),
            original.compliance_check,
        )
        .unwrap();

        assert_eq!(restored, original);
    }

    #[test]
    fn test_from_stored_rejects_unknown_action() {
        let result = AuditEntry::from_stored(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "CLAIM_TELEPORTED",
            Uuid::new_v4(),
            Utc::now(),
            serde_json::json!({"type": "claim_deleted", "claim_number": "CLM-202406-000001"}),
            false,
        );
        assert!(matches!(result, Err(crate::AuditError::UnknownAction(_))));
    }
}
