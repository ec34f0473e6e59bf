use std::sync::Arc;

use audit_engine::{AuditDetails, AuditEntry};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::compliance::ComplianceCheck;
use crate::error::{ClaimsError, ClaimsResult};
use crate::models::{
    Claim, ClaimDetail, ClaimFilter, ClaimItem, ClaimStatus, ComplianceStatus, NewClaim,
    SubmissionLog, TransitionDriver,
};
use crate::numbering::NumberScope;
use crate::repository::{ClaimsRepository, StatusChange};
use crate::validation::{default_service_code, line_total, validate_new_claim};

/// Claim Store: creation, reads and manual status transitions
#[derive(Clone)]
pub struct ClaimStore {
    repo: Arc<dyn ClaimsRepository>,
    provider_code: String,
}

impl ClaimStore {
    pub fn new(repo: Arc<dyn ClaimsRepository>, provider_code: impl Into<String>) -> Self {
        Self {
            repo,
            provider_code: provider_code.into(),
        }
    }

    /// Open a claim with its line items from a completed encounter
    ///
    /// The claim amount is the sum of the item totals, each computed as
    /// `quantity × unit_price`. Claim and items are written together.
    pub async fn create_claim(&self, new: NewClaim, created_by: Uuid) -> ClaimsResult<ClaimDetail> {
        validate_new_claim(&new)?;

        let now = Utc::now();
        let scope = NumberScope::Claim;
        let period = scope.period(now.date_naive());
        let seq = self.repo.next_sequence(scope, &period).await?;
        let claim_id = Uuid::new_v4();

        let items: Vec<ClaimItem> = new
            .items
            .iter()
            .map(|item| ClaimItem {
                id: Uuid::new_v4(),
                claim_id,
                service_type: item.service_type.clone(),
                service_code: item
                    .service_code
                    .clone()
                    .filter(|code| !code.trim().is_empty())
                    .unwrap_or_else(|| default_service_code(&item.service_type).to_string()),
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: line_total(item.quantity, item.unit_price),
                provided_by: item.provided_by.clone(),
                department: item.department.clone(),
                created_at: now,
            })
            .collect();
        let claim_amount: Decimal = items.iter().map(|item| item.total_price).sum();

        let claim = Claim {
            id: claim_id,
            claim_number: scope.format(&period, seq),
            patient_id: new.patient_id,
            visit_id: new.visit_id,
            op_number: new.op_number,
            member_number: new.member_number,
            visit_date: new.visit_date,
            primary_diagnosis: new.primary_diagnosis,
            secondary_diagnoses: new.secondary_diagnoses,
            provider_code: self.provider_code.clone(),
            claim_amount,
            status: if new.draft {
                ClaimStatus::Draft
            } else {
                ClaimStatus::ReadyToSubmit
            },
            compliance_status: ComplianceStatus::Pending,
            batch_id: None,
            sha_reference: None,
            submission_date: None,
            approved_amount: None,
            approval_date: None,
            rejection_reason: None,
            notes: new.notes,
            created_by,
            created_at: now,
            updated_at: now,
        };

        let audit = AuditEntry::new(
            claim.id,
            created_by,
            AuditDetails::ClaimCreated {
                claim_number: claim.claim_number.clone(),
                claim_amount,
                item_count: items.len(),
            },
        )
        .at(now);
        self.repo.insert_claim(&claim, &items, &audit).await?;

        tracing::info!(
            claim_id = %claim.id,
            claim_number = %claim.claim_number,
            claim_amount = %claim.claim_amount,
            status = %claim.status,
            "Claim created"
        );

        Ok(ClaimDetail { claim, items })
    }

    pub async fn get_claim(&self, claim_id: Uuid) -> ClaimsResult<ClaimDetail> {
        let claim = self.find(claim_id).await?;
        let items = self.repo.claim_items(claim_id).await?;
        Ok(ClaimDetail { claim, items })
    }

    pub async fn list_claims(&self, filter: &ClaimFilter) -> ClaimsResult<Vec<Claim>> {
        self.repo.list_claims(filter).await
    }

    pub async fn count_claims(&self, filter: &ClaimFilter) -> ClaimsResult<i64> {
        self.repo.count_claims(filter).await
    }

    /// Apply a user-requested status change
    ///
    /// Invoice generation and submission own their edges; requesting
    /// `invoice_ready` or `submitted` here fails with `InvalidTransition`.
    /// Reopening a rejected claim clears its batch assignment.
    pub async fn transition_status(
        &self,
        claim_id: Uuid,
        to: ClaimStatus,
        performed_by: Uuid,
        reason: Option<String>,
    ) -> ClaimsResult<Claim> {
        let claim = self.find(claim_id).await?;
        if !claim.status.allows(to, TransitionDriver::Manual) {
            return Err(ClaimsError::invalid_transition(claim.status, to));
        }

        let now = Utc::now();
        let change = StatusChange {
            claim_id,
            from: claim.status,
            to,
            clear_batch: claim.status == ClaimStatus::Rejected && to == ClaimStatus::ReadyToSubmit,
            at: now,
            audit: AuditEntry::new(
                claim_id,
                performed_by,
                AuditDetails::StatusChanged {
                    from: claim.status.to_string(),
                    to: to.to_string(),
                    reason,
                },
            )
            .at(now),
        };
        let updated = self.repo.update_claim_status(&change).await?;

        tracing::info!(
            claim_id = %claim_id,
            from = %change.from,
            to = %change.to,
            "Claim status changed"
        );
        Ok(updated)
    }

    /// Remove a claim that never reached invoicing or a batch
    pub async fn delete_claim(&self, claim_id: Uuid, deleted_by: Uuid) -> ClaimsResult<()> {
        let claim = self.find(claim_id).await?;
        if !matches!(claim.status, ClaimStatus::Draft | ClaimStatus::ReadyToSubmit)
            || claim.batch_id.is_some()
        {
            return Err(ClaimsError::invalid_transition(claim.status, "deleted"));
        }

        let audit = AuditEntry::new(
            claim_id,
            deleted_by,
            AuditDetails::ClaimDeleted {
                claim_number: claim.claim_number.clone(),
            },
        );
        self.repo.delete_claim(claim_id, &audit).await?;

        tracing::info!(claim_id = %claim_id, claim_number = %claim.claim_number, "Claim deleted");
        Ok(())
    }

    pub async fn submission_history(&self, claim_id: Uuid) -> ClaimsResult<Vec<SubmissionLog>> {
        self.find(claim_id).await?;
        self.repo.submission_logs_for_claim(claim_id).await
    }

    pub async fn audit_trail(&self, claim_id: Uuid) -> ClaimsResult<Vec<AuditEntry>> {
        self.repo.audit_for_claim(claim_id).await
    }

    /// Run the compliance checklist and store the outcome on the claim
    pub async fn record_compliance(
        &self,
        claim_id: Uuid,
        performed_by: Uuid,
    ) -> ClaimsResult<ComplianceCheck> {
        let claim = self.find(claim_id).await?;
        let check = ComplianceCheck::run(&claim, Utc::now().date_naive());
        let status = check.status();

        let audit = AuditEntry::new(
            claim_id,
            performed_by,
            AuditDetails::ComplianceVerified {
                status: status.to_string(),
                issues: check.issues.clone(),
            },
        );
        self.repo
            .set_compliance_status(claim_id, status, &audit)
            .await?;

        if !check.is_clean() {
            tracing::warn!(
                claim_id = %claim_id,
                issues = ?check.issues,
                "Claim failed compliance checklist"
            );
        }
        Ok(check)
    }

    async fn find(&self, claim_id: Uuid) -> ClaimsResult<Claim> {
        self.repo
            .find_claim(claim_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Claim", claim_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Diagnosis, NewClaimItem};
    use crate::repository::MemoryClaimsRepository;
    use chrono::NaiveDate;

    fn store() -> ClaimStore {
        ClaimStore::new(Arc::new(MemoryClaimsRepository::new()), "CLINIC001")
    }

    fn encounter(draft: bool) -> NewClaim {
        NewClaim {
            patient_id: Uuid::new_v4(),
            visit_id: Uuid::new_v4(),
            op_number: "OP-2001".into(),
            member_number: "987654321".into(),
            visit_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            primary_diagnosis: Diagnosis {
                code: "A09".into(),
                description: "Infectious gastroenteritis".into(),
            },
            secondary_diagnoses: vec![],
            items: vec![
                NewClaimItem {
                    service_type: "laboratory".into(),
                    service_code: None,
                    description: "Stool analysis".into(),
                    quantity: 2,
                    unit_price: Decimal::new(1500, 2),
                    provided_by: None,
                    department: Some("Lab".into()),
                },
                NewClaimItem {
                    service_type: "pharmacy".into(),
                    service_code: Some("MED042".into()),
                    description: "ORS sachets".into(),
                    quantity: 3,
                    unit_price: Decimal::new(250, 2),
                    provided_by: None,
                    department: None,
                },
            ],
            notes: None,
            draft,
        }
    }

    #[tokio::test]
    async fn test_create_claim_computes_totals_and_codes() {
        let store = store();
        let detail = store.create_claim(encounter(false), Uuid::new_v4()).await.unwrap();

        assert_eq!(detail.claim.claim_amount, Decimal::new(3750, 2));
        assert_eq!(detail.claim.status, ClaimStatus::ReadyToSubmit);
        assert_eq!(detail.claim.provider_code, "CLINIC001");
        assert!(detail.claim.claim_number.starts_with("CLM-"));
        assert_eq!(detail.items[0].service_code, "LAB001");
        assert_eq!(detail.items[0].total_price, Decimal::new(3000, 2));
        assert_eq!(detail.items[1].service_code, "MED042");
    }

    #[tokio::test]
    async fn test_claim_numbers_increase() {
        let store = store();
        let first = store.create_claim(encounter(false), Uuid::new_v4()).await.unwrap();
        let second = store.create_claim(encounter(false), Uuid::new_v4()).await.unwrap();
        assert!(second.claim.claim_number > first.claim.claim_number);
    }

    #[tokio::test]
    async fn test_manual_transition_cannot_skip_invoice() {
        let store = store();
        let detail = store.create_claim(encounter(true), Uuid::new_v4()).await.unwrap();
        let user = Uuid::new_v4();

        let ready = store
            .transition_status(detail.claim.id, ClaimStatus::ReadyToSubmit, user, None)
            .await
            .unwrap();
        assert_eq!(ready.status, ClaimStatus::ReadyToSubmit);

        let err = store
            .transition_status(detail.claim.id, ClaimStatus::InvoiceReady, user, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimsError::InvalidTransition { .. }));

        let trail = store.audit_trail(detail.claim.id).await.unwrap();
        assert_eq!(trail.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_draft_claim() {
        let store = store();
        let detail = store.create_claim(encounter(true), Uuid::new_v4()).await.unwrap();
        store.delete_claim(detail.claim.id, Uuid::new_v4()).await.unwrap();

        let err = store.get_claim(detail.claim.id).await.unwrap_err();
        assert!(matches!(err, ClaimsError::NotFound { .. }));
        // Audit history outlives the claim
        assert_eq!(store.audit_trail(detail.claim.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_compliance_flags_member_number() {
        let store = store();
        let mut new = encounter(false);
        new.member_number = "12345".into();
        let detail = store.create_claim(new, Uuid::new_v4()).await.unwrap();

        let check = store
            .record_compliance(detail.claim.id, Uuid::new_v4())
            .await
            .unwrap();
        assert!(!check.is_clean());

        let claim = store.get_claim(detail.claim.id).await.unwrap().claim;
        assert_eq!(claim.compliance_status, ComplianceStatus::Rejected);
    }
}
