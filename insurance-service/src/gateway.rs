use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use audit_engine::{AuditDetails, AuditEntry, DomainEvent, DomainEventPublisher};
use chrono::Utc;
use claims_service::{
    BatchClaimOutcome, BatchStatus, BatchSubmissionOutcome, Claim, ClaimStatus,
    ClaimSubmissionOutcome, ClaimsError, ClaimsRepository, Invoice, SubmissionFailure,
    SubmissionLog, SubmissionTarget, SubmissionType,
};
use uuid::Uuid;

use crate::client::InsurerClient;
use crate::error::{GatewayResult, InsurerError};
use crate::models::{
    BatchAck, BatchPayload, BatchSubmissionResult, ClaimPayload, RemoteStatus, SubmissionAck,
    SubmissionResult, SubmittedClaim,
};

/// Default bound on a single insurer call
pub const DEFAULT_INSURER_TIMEOUT: Duration = Duration::from_secs(30);

/// Submission Gateway: sends invoiced claims to the insurer exactly once
///
/// Each attempt is bracketed by two separate repository calls. A `pending`
/// submission log holding the exact payload is written before the insurer is
/// contacted; the outcome (claim, invoice and log updated together, or the log
/// marked failed) is written after. No transaction is open across the network
/// call. If the process dies in between, the pending log is picked up by the
/// [`Reconciler`](crate::Reconciler).
#[derive(Clone)]
pub struct SubmissionGateway {
    repo: Arc<dyn ClaimsRepository>,
    client: Arc<dyn InsurerClient>,
    events: Arc<dyn DomainEventPublisher>,
    provider_code: String,
    timeout: Duration,
}

/// A member claim with the open invoice that will be locked with it
struct Submittable {
    claim: Claim,
    invoice: Invoice,
}

impl SubmissionGateway {
    pub fn new(
        repo: Arc<dyn ClaimsRepository>,
        client: Arc<dyn InsurerClient>,
        events: Arc<dyn DomainEventPublisher>,
        provider_code: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            client,
            events,
            provider_code: provider_code.into(),
            timeout,
        }
    }

    /// Submit one invoiced claim
    ///
    /// Fails before any external call with `InvoiceNotReady` when the claim has
    /// no generated or printed invoice, and with `SubmissionInProgress` when
    /// another attempt for the claim is still pending. Insurer failures and
    /// timeouts are returned as an unsuccessful [`SubmissionResult`].
    pub async fn submit_claim(
        &self,
        claim_id: Uuid,
        submitted_by: Uuid,
    ) -> GatewayResult<SubmissionResult> {
        let claim = self.find_claim(claim_id).await?;
        if let Some(batch_id) = claim.batch_id {
            if !claim.status.is_submitted_or_later() {
                return Err(ClaimsError::Validation(format!(
                    "Claim {} belongs to batch {batch_id}; submit the batch instead",
                    claim.claim_number
                ))
                .into());
            }
        }
        let target = self.submittable(claim).await?;

        let items = self.repo.claim_items(claim_id).await?;
        let payload =
            ClaimPayload::build(&target.claim, &target.invoice, &items, &self.provider_code);
        let request = serde_json::to_value(&payload).map_err(InsurerError::from)?;

        let retry_count = self
            .repo
            .previous_attempts(SubmissionTarget::Claim(claim_id))
            .await?;
        let log = SubmissionLog::pending_for_claim(
            claim_id,
            target.invoice.id,
            request,
            retry_count,
            submitted_by,
        );
        self.repo.begin_submission(&log).await?;

        tracing::info!(
            claim_id = %claim_id,
            claim_number = %target.claim.claim_number,
            invoice_number = %target.invoice.invoice_number,
            submission_log_id = %log.id,
            retry_count,
            "Submitting claim to insurer"
        );

        match self.bounded(self.client.submit_claim(&payload)).await {
            Ok(ack) => {
                let sha_reference = ack.reference.clone();
                self.confirm_claim(&log, ack).await?;
                Ok(SubmissionResult {
                    success: true,
                    submission_log_id: log.id,
                    retry_count,
                    sha_reference: Some(sha_reference),
                    error: None,
                })
            }
            Err(err) => {
                let message = err.to_string();
                self.record_failure(&log, &message, err.response_payload())
                    .await?;
                Ok(SubmissionResult {
                    success: false,
                    submission_log_id: log.id,
                    retry_count,
                    sha_reference: None,
                    error: Some(message),
                })
            }
        }
    }

    /// Submit every member of a draft batch in one insurer call
    ///
    /// All members must be invoiced. On success every claim and invoice is
    /// locked together with the batch; on failure nothing changes and the batch
    /// stays a resubmittable draft.
    pub async fn submit_batch(
        &self,
        batch_id: Uuid,
        submitted_by: Uuid,
    ) -> GatewayResult<BatchSubmissionResult> {
        let batch = self
            .repo
            .find_batch(batch_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Batch", batch_id))?;
        if batch.status != BatchStatus::Draft {
            return Err(ClaimsError::BatchNotDraft {
                batch_number: batch.batch_number,
                status: batch.status,
            }
            .into());
        }

        let members = self.repo.batch_claims(batch_id).await?;
        if members.is_empty() {
            return Err(ClaimsError::NoEligibleClaims.into());
        }
        let mut payloads = Vec::with_capacity(members.len());
        for claim in members {
            let claim_id = claim.id;
            let target = self.submittable(claim).await?;
            let items = self.repo.claim_items(claim_id).await?;
            payloads.push(ClaimPayload::build(
                &target.claim,
                &target.invoice,
                &items,
                &self.provider_code,
            ));
        }
        let payload = BatchPayload::build(&batch, payloads, &self.provider_code);
        let request = serde_json::to_value(&payload).map_err(InsurerError::from)?;

        let retry_count = self
            .repo
            .previous_attempts(SubmissionTarget::Batch(batch_id))
            .await?;
        let log = SubmissionLog::pending_for_batch(batch_id, request, retry_count, submitted_by);
        self.repo.begin_submission(&log).await?;

        tracing::info!(
            batch_id = %batch_id,
            batch_number = %batch.batch_number,
            total_claims = payload.total_claims,
            total_amount = %payload.total_amount,
            submission_log_id = %log.id,
            retry_count,
            "Submitting batch to insurer"
        );

        match self.bounded(self.client.submit_batch(&payload)).await {
            Ok(ack) => {
                let sha_batch_reference = ack.reference.clone();
                let claims = self.confirm_batch(&log, ack).await?;
                Ok(BatchSubmissionResult {
                    success: true,
                    batch_id,
                    submission_log_id: log.id,
                    retry_count,
                    sha_batch_reference: Some(sha_batch_reference),
                    claims,
                    error: None,
                })
            }
            Err(err) => {
                let message = err.to_string();
                self.record_failure(&log, &message, err.response_payload())
                    .await?;
                Ok(BatchSubmissionResult {
                    success: false,
                    batch_id,
                    submission_log_id: log.id,
                    retry_count,
                    sha_batch_reference: None,
                    claims: Vec::new(),
                    error: Some(message),
                })
            }
        }
    }

    /// Apply an accepted single-claim submission recorded by `log`
    ///
    /// Used for live answers and for pending attempts the insurer turns out to
    /// have registered. If the claim moved on concurrently the write is rolled
    /// back and the log stays pending.
    pub(crate) async fn confirm_claim(
        &self,
        log: &SubmissionLog,
        ack: SubmissionAck,
    ) -> GatewayResult<()> {
        let (claim_id, invoice_id) = match (log.claim_id, log.invoice_id) {
            (Some(claim_id), Some(invoice_id)) => (claim_id, invoice_id),
            _ => {
                return Err(ClaimsError::Validation(format!(
                    "Submission log {} does not reference a claim invoice",
                    log.id
                ))
                .into())
            }
        };
        let claim = self.find_claim(claim_id).await?;
        let invoice = self
            .repo
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Invoice", invoice_id))?;

        let submitted_at = Utc::now();
        let outcome = ClaimSubmissionOutcome {
            log_id: log.id,
            claim_id,
            invoice_id,
            sha_reference: ack.reference.clone(),
            response_payload: ack.body,
            submitted_by: log.submitted_by,
            submitted_at,
            audit: AuditEntry::new(
                claim_id,
                log.submitted_by,
                AuditDetails::ClaimSubmitted {
                    invoice_number: invoice.invoice_number.clone(),
                    sha_reference: ack.reference.clone(),
                    submission_log_id: log.id,
                    batch_number: None,
                    invoice_locked: true,
                },
            )
            .for_invoice(invoice_id)
            .at(submitted_at),
        };

        if let Err(err) = self.repo.complete_claim_submission(&outcome).await {
            tracing::error!(
                claim_id = %claim_id,
                submission_log_id = %log.id,
                sha_reference = %ack.reference,
                error = %err,
                "Insurer accepted claim but local state could not be updated; left for reconciliation"
            );
            return Err(err.into());
        }

        tracing::info!(
            claim_id = %claim_id,
            invoice_number = %invoice.invoice_number,
            sha_reference = %ack.reference,
            "Claim submitted; invoice locked"
        );
        self.publish_locked(&claim, &invoice, &ack.reference, None)
            .await;
        Ok(())
    }

    /// Apply an accepted batch submission recorded by `log`
    pub(crate) async fn confirm_batch(
        &self,
        log: &SubmissionLog,
        ack: BatchAck,
    ) -> GatewayResult<Vec<SubmittedClaim>> {
        let batch_id = log.batch_id.ok_or_else(|| {
            ClaimsError::Validation(format!("Submission log {} has no batch", log.id))
        })?;
        let batch = self
            .repo
            .find_batch(batch_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Batch", batch_id))?;

        let submitted_at = Utc::now();
        let mut members = Vec::new();
        for claim in self.repo.batch_claims(batch_id).await? {
            let target = self.submittable(claim).await?;
            members.push(target);
        }

        let outcome = BatchSubmissionOutcome {
            log_id: log.id,
            batch_id,
            sha_batch_reference: ack.reference.clone(),
            response_payload: ack.body.clone(),
            submitted_by: log.submitted_by,
            submitted_at,
            claims: members
                .iter()
                .map(|m| {
                    let sha_reference = ack.reference_for(&m.claim.claim_number).to_string();
                    BatchClaimOutcome {
                        claim_id: m.claim.id,
                        invoice_id: m.invoice.id,
                        audit: AuditEntry::new(
                            m.claim.id,
                            log.submitted_by,
                            AuditDetails::ClaimSubmitted {
                                invoice_number: m.invoice.invoice_number.clone(),
                                sha_reference: sha_reference.clone(),
                                submission_log_id: log.id,
                                batch_number: Some(batch.batch_number.clone()),
                                invoice_locked: true,
                            },
                        )
                        .for_invoice(m.invoice.id)
                        .at(submitted_at),
                        sha_reference,
                    }
                })
                .collect(),
        };

        if let Err(err) = self.repo.complete_batch_submission(&outcome).await {
            tracing::error!(
                batch_id = %batch_id,
                submission_log_id = %log.id,
                sha_batch_reference = %ack.reference,
                error = %err,
                "Insurer accepted batch but local state could not be updated; left for reconciliation"
            );
            return Err(err.into());
        }

        tracing::info!(
            batch_id = %batch_id,
            batch_number = %batch.batch_number,
            sha_batch_reference = %ack.reference,
            total_claims = members.len(),
            "Batch submitted; member invoices locked"
        );

        self.events
            .publish(DomainEvent::BatchSubmitted {
                batch_id,
                batch_number: batch.batch_number.clone(),
                sha_batch_reference: ack.reference.clone(),
                total_claims: i32::try_from(members.len()).unwrap_or(i32::MAX),
            })
            .await;

        let mut submitted = Vec::with_capacity(members.len());
        for m in &members {
            let sha_reference = ack.reference_for(&m.claim.claim_number).to_string();
            self.publish_locked(&m.claim, &m.invoice, &sha_reference, Some(batch_id))
                .await;
            submitted.push(SubmittedClaim {
                claim_id: m.claim.id,
                claim_number: m.claim.claim_number.clone(),
                sha_reference,
            });
        }
        Ok(submitted)
    }

    /// Mark a pending attempt failed and audit it on every claim it covered
    pub(crate) async fn record_failure(
        &self,
        log: &SubmissionLog,
        message: &str,
        response_payload: Option<serde_json::Value>,
    ) -> GatewayResult<()> {
        let covered: Vec<(Uuid, Option<Uuid>)> = match log.submission_type {
            SubmissionType::Single => log
                .claim_id
                .map(|claim_id| vec![(claim_id, log.invoice_id)])
                .unwrap_or_default(),
            SubmissionType::Batch => match log.batch_id {
                Some(batch_id) => {
                    let mut covered = Vec::new();
                    for claim in self.repo.batch_claims(batch_id).await? {
                        let open = self.open_invoice(claim.id).await?;
                        covered.push((claim.id, open.map(|invoice| invoice.id)));
                    }
                    covered
                }
                None => Vec::new(),
            },
        };

        let completed_at = Utc::now();
        let audits = covered
            .into_iter()
            .map(|(claim_id, invoice_id)| {
                let entry = AuditEntry::new(
                    claim_id,
                    log.submitted_by,
                    AuditDetails::SubmissionFailed {
                        submission_log_id: log.id,
                        error: message.to_string(),
                    },
                )
                .at(completed_at);
                match invoice_id {
                    Some(invoice_id) => entry.for_invoice(invoice_id),
                    None => entry,
                }
            })
            .collect();

        self.repo
            .fail_submission(&SubmissionFailure {
                log_id: log.id,
                error_message: message.to_string(),
                response_payload,
                completed_at,
                audits,
            })
            .await?;

        tracing::warn!(
            submission_log_id = %log.id,
            submission_type = %log.submission_type,
            claim_id = ?log.claim_id,
            batch_id = ?log.batch_id,
            retry_count = log.retry_count,
            error = %message,
            "Insurer submission failed; claim remains resubmittable"
        );
        Ok(())
    }

    pub(crate) async fn remote_claim_status(
        &self,
        reference: &str,
    ) -> Result<RemoteStatus, InsurerError> {
        self.bounded(self.client.claim_status(reference)).await
    }

    pub(crate) async fn remote_batch_status(
        &self,
        batch_number: &str,
    ) -> Result<BatchAck, InsurerError> {
        self.bounded(self.client.batch_status(batch_number)).await
    }

    pub(crate) fn repository(&self) -> &Arc<dyn ClaimsRepository> {
        &self.repo
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, InsurerError>>,
    ) -> Result<T, InsurerError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(InsurerError::Timeout(self.timeout)))
    }

    async fn find_claim(&self, claim_id: Uuid) -> GatewayResult<Claim> {
        Ok(self
            .repo
            .find_claim(claim_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Claim", claim_id))?)
    }

    /// Latest invoice revision that is not yet locked
    async fn open_invoice(&self, claim_id: Uuid) -> GatewayResult<Option<Invoice>> {
        let invoices = self.repo.invoices_for_claim(claim_id).await?;
        Ok(invoices
            .into_iter()
            .rev()
            .find(|invoice| !invoice.status.is_locked()))
    }

    /// Pair a claim with its open invoice, checking it may be submitted
    async fn submittable(&self, claim: Claim) -> GatewayResult<Submittable> {
        let Some(invoice) = self.open_invoice(claim.id).await? else {
            return Err(ClaimsError::InvoiceNotReady(format!(
                "Claim {} has no generated invoice; generate the invoice before submitting",
                claim.claim_number
            ))
            .into());
        };
        if claim.status != ClaimStatus::InvoiceReady {
            return Err(ClaimsError::invalid_transition(claim.status, ClaimStatus::Submitted).into());
        }
        Ok(Submittable { claim, invoice })
    }

    async fn publish_locked(
        &self,
        claim: &Claim,
        invoice: &Invoice,
        sha_reference: &str,
        batch_id: Option<Uuid>,
    ) {
        self.events
            .publish(DomainEvent::ClaimSubmitted {
                claim_id: claim.id,
                claim_number: claim.claim_number.clone(),
                sha_reference: sha_reference.to_string(),
                batch_id,
            })
            .await;
        self.events
            .publish(DomainEvent::InvoiceLocked {
                invoice_id: invoice.id,
                invoice_number: invoice.invoice_number.clone(),
                claim_id: claim.id,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockInsurerClient;
    use audit_engine::{AuditAction, RecordingEventPublisher};
    use chrono::NaiveDate;
    use claims_service::{
        ClaimStore, Diagnosis, InvoiceGenerator, MemoryClaimsRepository, NewClaim, NewClaimItem,
        SubmissionStatus,
    };
    use rust_decimal::Decimal;

    struct Fixture {
        repo: Arc<dyn ClaimsRepository>,
        events: Arc<RecordingEventPublisher>,
        claims: ClaimStore,
        invoices: InvoiceGenerator,
    }

    fn fixture() -> Fixture {
        let repo: Arc<dyn ClaimsRepository> = Arc::new(MemoryClaimsRepository::new());
        Fixture {
            events: Arc::new(RecordingEventPublisher::new()),
            claims: ClaimStore::new(repo.clone(), "CLINIC001"),
            invoices: InvoiceGenerator::new(repo.clone(), 30),
            repo,
        }
    }

    impl Fixture {
        fn gateway(&self, client: MockInsurerClient) -> SubmissionGateway {
            SubmissionGateway::new(
                self.repo.clone(),
                Arc::new(client),
                self.events.clone(),
                "CLINIC001",
                Duration::from_secs(5),
            )
        }

        async fn invoiced_claim(&self) -> Claim {
            let user = Uuid::new_v4();
            let detail = self
                .claims
                .create_claim(
                    NewClaim {
                        patient_id: Uuid::new_v4(),
                        visit_id: Uuid::new_v4(),
                        op_number: "OP-77".into(),
                        member_number: "555666777".into(),
                        visit_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
                        primary_diagnosis: Diagnosis {
                            code: "I10".into(),
                            description: "Essential hypertension".into(),
                        },
                        secondary_diagnoses: vec![],
                        items: vec![NewClaimItem {
                            service_type: "consultation".into(),
                            service_code: None,
                            description: "Review".into(),
                            quantity: 1,
                            unit_price: Decimal::new(1500, 0),
                            provided_by: None,
                            department: None,
                        }],
                        notes: None,
                        draft: false,
                    },
                    user,
                )
                .await
                .unwrap();
            self.invoices
                .generate_invoice(detail.claim.id, user)
                .await
                .unwrap();
            detail.claim
        }
    }

    #[tokio::test]
    async fn test_submit_claim_sends_normalized_payload() {
        let fx = fixture();
        let claim = fx.invoiced_claim().await;

        let mut client = MockInsurerClient::new();
        let expected_number = claim.claim_number.clone();
        client
            .expect_submit_claim()
            .withf(move |payload| {
                payload.claim_number == expected_number
                    && payload.provider_code == "CLINIC001"
                    && payload.services.len() == 1
                    && payload.total_amount == Decimal::new(1500, 0)
            })
            .times(1)
            .returning(|_| {
                SubmissionAck::from_body(serde_json::json!({"reference": "SHA-REF-1"}))
            });

        let result = fx
            .gateway(client)
            .submit_claim(claim.id, Uuid::new_v4())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.sha_reference.as_deref(), Some("SHA-REF-1"));
        assert_eq!(result.retry_count, 0);

        let names: Vec<_> = fx.events.events().iter().map(DomainEvent::name).collect();
        assert_eq!(names, vec!["claim_submitted", "invoice_locked"]);
    }

    #[tokio::test]
    async fn test_rejection_is_reported_not_raised() {
        let fx = fixture();
        let claim = fx.invoiced_claim().await;

        let mut client = MockInsurerClient::new();
        client.expect_submit_claim().times(1).returning(|_| {
            Err(InsurerError::Rejected {
                status: 422,
                body: r#"{"error":"member not active"}"#.into(),
            })
        });

        let result = fx
            .gateway(client)
            .submit_claim(claim.id, Uuid::new_v4())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("422"));

        let log = fx
            .repo
            .find_submission_log(result.submission_log_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.status, SubmissionStatus::Failed);
        assert_eq!(
            log.response_payload.unwrap()["error"],
            "member not active"
        );

        let trail = fx.repo.audit_for_claim(claim.id).await.unwrap();
        assert!(trail
            .iter()
            .any(|entry| entry.action == AuditAction::SubmissionFailed));
        assert!(fx.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_retry_count_follows_earlier_attempts() {
        let fx = fixture();
        let claim = fx.invoiced_claim().await;

        let mut client = MockInsurerClient::new();
        let mut calls = 0;
        client.expect_submit_claim().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(InsurerError::Rejected {
                    status: 503,
                    body: "busy".into(),
                })
            } else {
                SubmissionAck::from_body(serde_json::json!({"claim_reference": "SHA-REF-2"}))
            }
        });
        let gateway = fx.gateway(client);

        let first = gateway.submit_claim(claim.id, Uuid::new_v4()).await.unwrap();
        let second = gateway.submit_claim(claim.id, Uuid::new_v4()).await.unwrap();
        assert!(!first.success);
        assert!(second.success);
        assert_eq!(second.retry_count, 1);
    }

    #[tokio::test]
    async fn test_submitted_claim_cannot_be_resent() {
        let fx = fixture();
        let claim = fx.invoiced_claim().await;

        let mut client = MockInsurerClient::new();
        client.expect_submit_claim().times(1).returning(|_| {
            SubmissionAck::from_body(serde_json::json!({"reference": "SHA-REF-3"}))
        });
        let gateway = fx.gateway(client);

        gateway.submit_claim(claim.id, Uuid::new_v4()).await.unwrap();
        let err = gateway
            .submit_claim(claim.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::GatewayError::Claims(ClaimsError::InvoiceNotReady(_))
        ));
    }
}
