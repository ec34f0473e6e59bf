use std::sync::Arc;
use std::time::Duration;

use audit_engine::{AuditAction, DomainEvent, RecordingEventPublisher};
use chrono::Utc;
use claims_service::{
    BatchManager, BatchStatus, BatchType, Claim, ClaimStatus, ClaimStore, ClaimsError,
    ClaimsRepository, Diagnosis, InvoiceGenerator, InvoiceStatus, MemoryClaimsRepository,
    NewBatch, NewClaim, NewClaimItem, SubmissionLog, SubmissionStatus,
    DEFAULT_PAYMENT_TERMS_DAYS,
};
use insurance_service::{
    GatewayError, Reconciler, ScriptedInsurerClient, ScriptedReply, SubmissionGateway,
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

struct Harness {
    repo: Arc<dyn ClaimsRepository>,
    insurer: Arc<ScriptedInsurerClient>,
    events: Arc<RecordingEventPublisher>,
    claims: ClaimStore,
    invoices: InvoiceGenerator,
    batches: BatchManager,
    gateway: SubmissionGateway,
    reconciler: Reconciler,
}

fn harness_with_timeout(timeout: Duration) -> Harness {
    let repo: Arc<dyn ClaimsRepository> = Arc::new(MemoryClaimsRepository::new());
    let insurer = Arc::new(ScriptedInsurerClient::new());
    let events = Arc::new(RecordingEventPublisher::new());
    let gateway = SubmissionGateway::new(
        repo.clone(),
        insurer.clone(),
        events.clone(),
        "CLINIC001",
        timeout,
    );
    Harness {
        claims: ClaimStore::new(repo.clone(), "CLINIC001"),
        invoices: InvoiceGenerator::new(repo.clone(), DEFAULT_PAYMENT_TERMS_DAYS),
        batches: BatchManager::new(repo.clone()),
        reconciler: Reconciler::new(gateway.clone(), events.clone(), Duration::ZERO),
        gateway,
        repo,
        insurer,
        events,
    }
}

fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(5))
}

fn encounter(amounts: &[i64]) -> NewClaim {
    NewClaim {
        patient_id: Uuid::new_v4(),
        visit_id: Uuid::new_v4(),
        op_number: "OP-9001".into(),
        member_number: "112233445".into(),
        visit_date: Utc::now().date_naive(),
        primary_diagnosis: Diagnosis {
            code: "E11.9".into(),
            description: "Type 2 diabetes mellitus without complications".into(),
        },
        secondary_diagnoses: vec![],
        items: amounts
            .iter()
            .map(|amount| NewClaimItem {
                service_type: "laboratory".into(),
                service_code: None,
                description: "HbA1c".into(),
                quantity: 1,
                unit_price: Decimal::new(*amount, 0),
                provided_by: None,
                department: Some("Lab".into()),
            })
            .collect(),
        notes: None,
        draft: false,
    }
}

impl Harness {
    async fn ready_claim(&self, amounts: &[i64]) -> Claim {
        self.claims
            .create_claim(encounter(amounts), Uuid::new_v4())
            .await
            .unwrap()
            .claim
    }

    async fn invoiced_claim(&self, amounts: &[i64]) -> Claim {
        let claim = self.ready_claim(amounts).await;
        self.invoices
            .generate_invoice(claim.id, Uuid::new_v4())
            .await
            .unwrap();
        claim
    }

    async fn claim(&self, claim_id: Uuid) -> Claim {
        self.claims.get_claim(claim_id).await.unwrap().claim
    }
}

#[tokio::test]
async fn test_scenario_b_submission_requires_invoice() {
    let h = harness();
    let claim = h.ready_claim(&[50, 30]).await;

    let err = h
        .gateway
        .submit_claim(claim.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Claims(ClaimsError::InvoiceNotReady(_))
    ));
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::ReadyToSubmit);
    assert!(h.insurer.received().is_empty());
    assert!(h
        .claims
        .submission_history(claim.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_scenario_c_success_locks_claim_and_invoice() {
    let h = harness();
    let claim = h.invoiced_claim(&[50, 30]).await;
    let user = Uuid::new_v4();
    h.insurer
        .push_reply(ScriptedReply::Accept(json!({"reference": "SHA-2024-0001"})));

    let result = h.gateway.submit_claim(claim.id, user).await.unwrap();
    assert!(result.success);
    assert_eq!(result.sha_reference.as_deref(), Some("SHA-2024-0001"));

    let submitted = h.claim(claim.id).await;
    assert_eq!(submitted.status, ClaimStatus::Submitted);
    assert_eq!(submitted.sha_reference.as_deref(), Some("SHA-2024-0001"));
    assert!(submitted.submission_date.is_some());

    let invoice = &h.repo.invoices_for_claim(claim.id).await.unwrap()[0];
    assert_eq!(invoice.status, InvoiceStatus::Submitted);
    assert_eq!(invoice.submitted_by, Some(user));
    assert_eq!(invoice.sha_reference.as_deref(), Some("SHA-2024-0001"));

    let history = h.claims.submission_history(claim.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SubmissionStatus::Success);
    assert_eq!(history[0].request_payload["total_amount"], "80");
    assert_eq!(history[0].request_payload["provider_code"], "CLINIC001");

    let err = h.invoices.mark_printed(invoice.id, user).await.unwrap_err();
    assert!(matches!(err, ClaimsError::InvoiceLocked { .. }));

    let trail = h.invoices.audit_trail(invoice.id).await.unwrap();
    assert!(trail
        .iter()
        .any(|entry| entry.action == AuditAction::ClaimSubmittedToSha));
}

#[tokio::test]
async fn test_scenario_d_timeout_leaves_claim_resubmittable() {
    let h = harness_with_timeout(Duration::from_millis(50));
    let claim = h.invoiced_claim(&[120]).await;
    h.insurer.push_reply(ScriptedReply::Hang);

    let result = h
        .gateway
        .submit_claim(claim.id, Uuid::new_v4())
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.error.is_some());

    let log = h
        .repo
        .find_submission_log(result.submission_log_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.status, SubmissionStatus::Failed);
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::InvoiceReady);

    let trail = h.claims.audit_trail(claim.id).await.unwrap();
    assert!(!trail
        .iter()
        .any(|entry| entry.action == AuditAction::ClaimSubmittedToSha));
    assert!(trail
        .iter()
        .any(|entry| entry.action == AuditAction::SubmissionFailed));

    // The queue is empty again, so the retry is accepted
    let retry = h
        .gateway
        .submit_claim(claim.id, Uuid::new_v4())
        .await
        .unwrap();
    assert!(retry.success);
    assert_eq!(retry.retry_count, 1);
}

#[tokio::test]
async fn test_pending_attempt_blocks_concurrent_submission() {
    let h = harness();
    let claim = h.invoiced_claim(&[75]).await;
    let invoice = h
        .invoices
        .open_invoice_for_claim(claim.id)
        .await
        .unwrap()
        .unwrap();

    let in_flight =
        SubmissionLog::pending_for_claim(claim.id, invoice.id, json!({}), 0, Uuid::new_v4());
    h.repo.begin_submission(&in_flight).await.unwrap();

    let err = h
        .gateway
        .submit_claim(claim.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Claims(ClaimsError::SubmissionInProgress { .. })
    ));
    assert!(h.insurer.received().is_empty());
}

async fn invoiced_batch(h: &Harness, count: usize) -> (Uuid, Vec<Uuid>) {
    let user = Uuid::new_v4();
    let mut ids = Vec::new();
    for n in 0..count {
        let amount = 100 * i64::try_from(n + 1).unwrap();
        ids.push(h.ready_claim(&[amount]).await.id);
    }
    let batch = h
        .batches
        .create_batch(
            NewBatch {
                batch_type: BatchType::Custom,
                batch_date: None,
                claim_ids: ids.clone(),
                start_date: None,
                end_date: None,
            },
            user,
        )
        .await
        .unwrap();
    let generated = h.invoices.generate_for_batch(batch.id, user).await.unwrap();
    assert_eq!(generated.generated.len(), count);
    (batch.id, ids)
}

#[tokio::test]
async fn test_batch_submission_moves_all_members_together() {
    let h = harness();
    let (batch_id, ids) = invoiced_batch(&h, 3).await;

    let result = h
        .gateway
        .submit_batch(batch_id, Uuid::new_v4())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.claims.len(), 3);

    let batch = h.batches.get_batch(batch_id).await.unwrap();
    assert_eq!(batch.batch.status, BatchStatus::Submitted);
    assert!(batch.batch.sha_batch_reference.is_some());
    for id in &ids {
        let claim = h.claim(*id).await;
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.batch_id, Some(batch_id));
        let invoices = h.repo.invoices_for_claim(*id).await.unwrap();
        assert_eq!(invoices[0].status, InvoiceStatus::Submitted);
    }

    let payload = &h.insurer.received()[0];
    assert_eq!(payload["total_claims"], 3);
    assert_eq!(payload["total_amount"], "600");

    let submitted_events = h
        .events
        .events()
        .iter()
        .filter(|event| matches!(event, DomainEvent::ClaimSubmitted { .. }))
        .count();
    assert_eq!(submitted_events, 3);

    let err = h
        .gateway
        .submit_batch(batch_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Claims(ClaimsError::BatchNotDraft { .. })
    ));
}

#[tokio::test]
async fn test_failed_batch_submission_changes_nothing() {
    let h = harness();
    let (batch_id, ids) = invoiced_batch(&h, 2).await;
    h.insurer.push_reply(ScriptedReply::Reject {
        status: 502,
        body: "upstream unavailable".into(),
    });

    let result = h
        .gateway
        .submit_batch(batch_id, Uuid::new_v4())
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.claims.is_empty());

    let batch = h.batches.get_batch(batch_id).await.unwrap();
    assert_eq!(batch.batch.status, BatchStatus::Draft);
    for id in &ids {
        assert_eq!(h.claim(*id).await.status, ClaimStatus::InvoiceReady);
        let failures = h
            .claims
            .audit_trail(*id)
            .await
            .unwrap()
            .into_iter()
            .filter(|entry| entry.action == AuditAction::SubmissionFailed)
            .count();
        assert_eq!(failures, 1);
    }
}

#[tokio::test]
async fn test_batch_member_cannot_be_submitted_alone() {
    let h = harness();
    let (_, ids) = invoiced_batch(&h, 1).await;

    let err = h
        .gateway
        .submit_claim(ids[0], Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Claims(ClaimsError::Validation(_))));
}

#[tokio::test]
async fn test_reconciliation_confirms_stale_pending_attempt() {
    let h = harness();
    let claim = h.invoiced_claim(&[200]).await;
    let invoice = h
        .invoices
        .open_invoice_for_claim(claim.id)
        .await
        .unwrap()
        .unwrap();

    // Process died after the insurer accepted the claim
    let log = SubmissionLog::pending_for_claim(claim.id, invoice.id, json!({}), 0, Uuid::new_v4());
    h.repo.begin_submission(&log).await.unwrap();
    h.insurer.set_claim_status(
        claim.claim_number.clone(),
        json!({"status": "received", "reference": "SHA-LATE-1"}),
    );
    h.insurer
        .set_claim_status("SHA-LATE-1", json!({"status": "received"}));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.pending_checked, 1);
    assert_eq!(report.pending_confirmed, 1);
    assert!(report.errors.is_empty());

    let claim = h.claim(claim.id).await;
    assert_eq!(claim.status, ClaimStatus::Submitted);
    assert_eq!(claim.sha_reference.as_deref(), Some("SHA-LATE-1"));
    let log = h.repo.find_submission_log(log.id).await.unwrap().unwrap();
    assert_eq!(log.status, SubmissionStatus::Success);
}

#[tokio::test]
async fn test_stale_resubmission_is_not_confirmed_by_earlier_record() {
    let h = harness();
    let user = Uuid::new_v4();
    let claim = h.invoiced_claim(&[300]).await;
    let first = h.gateway.submit_claim(claim.id, user).await.unwrap();
    let old_reference = first.sha_reference.unwrap();

    h.insurer
        .set_claim_status(old_reference.clone(), json!({"status": "rejected"}));
    h.reconciler.run().await.unwrap();
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::Rejected);

    h.claims
        .transition_status(claim.id, ClaimStatus::ReadyToSubmit, user, None)
        .await
        .unwrap();
    let revision = h.invoices.generate_invoice(claim.id, user).await.unwrap();
    assert_eq!(revision.revision, 2);

    // Resubmission died in flight; the claim-number lookup still answers with
    // the rejected first attempt
    let log = SubmissionLog::pending_for_claim(claim.id, revision.id, json!({}), 1, user);
    h.repo.begin_submission(&log).await.unwrap();
    h.insurer.set_claim_status(
        claim.claim_number.clone(),
        json!({"status": "rejected", "reference": old_reference}),
    );
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.pending_checked, 1);
    assert_eq!(report.pending_confirmed, 0);
    assert_eq!(report.pending_failed, 1);

    let log = h.repo.find_submission_log(log.id).await.unwrap().unwrap();
    assert_eq!(log.status, SubmissionStatus::Failed);
    let invoices = h.repo.invoices_for_claim(claim.id).await.unwrap();
    assert_eq!(invoices[1].status, InvoiceStatus::Generated);
    assert_eq!(invoices[1].sha_reference, None);
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::InvoiceReady);

    // Revision 2 is still open, so a real resubmission goes through
    let retry = h.gateway.submit_claim(claim.id, user).await.unwrap();
    assert!(retry.success);
    assert_ne!(retry.sha_reference.as_deref(), Some(old_reference.as_str()));
}

#[tokio::test]
async fn test_reconciliation_confirms_stale_pending_batch() {
    let h = harness();
    let (batch_id, claim_ids) = invoiced_batch(&h, 2).await;
    let batch = h.batches.get_batch(batch_id).await.unwrap().batch;

    let log = SubmissionLog::pending_for_batch(batch_id, json!({}), 0, Uuid::new_v4());
    h.repo.begin_submission(&log).await.unwrap();

    let mut acknowledged = Vec::new();
    for (n, claim_id) in claim_ids.iter().enumerate() {
        let claim_number = h.claim(*claim_id).await.claim_number;
        let reference = format!("SHA-LATE-{n}");
        h.insurer
            .set_claim_status(reference.clone(), json!({"status": "received"}));
        acknowledged.push(json!({"claim_number": claim_number, "reference": reference}));
    }
    h.insurer.set_batch_status(
        batch.batch_number.clone(),
        json!({"batch_reference": "SHA-B-LATE", "claims": acknowledged}),
    );
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.pending_checked, 1);
    assert_eq!(report.pending_confirmed, 1);
    assert!(report.errors.is_empty());

    let log = h.repo.find_submission_log(log.id).await.unwrap().unwrap();
    assert_eq!(log.status, SubmissionStatus::Success);
    let batch = h.batches.get_batch(batch_id).await.unwrap().batch;
    assert_eq!(batch.status, BatchStatus::Submitted);
    assert_eq!(batch.sha_batch_reference.as_deref(), Some("SHA-B-LATE"));
    for (n, claim_id) in claim_ids.iter().enumerate() {
        let claim = h.claim(*claim_id).await;
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.sha_reference, Some(format!("SHA-LATE-{n}")));
    }
}

#[tokio::test]
async fn test_unreachable_insurer_leaves_attempt_pending() {
    let h = harness();
    let claim = h.invoiced_claim(&[200]).await;
    let invoice = h
        .invoices
        .open_invoice_for_claim(claim.id)
        .await
        .unwrap()
        .unwrap();
    let log = SubmissionLog::pending_for_claim(claim.id, invoice.id, json!({}), 0, Uuid::new_v4());
    h.repo.begin_submission(&log).await.unwrap();
    h.insurer.set_status_outage(true);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.pending_checked, 1);
    assert_eq!(report.pending_confirmed, 0);
    assert_eq!(report.pending_failed, 0);
    assert!(report.errors.is_empty());
    let pending = h.repo.find_submission_log(log.id).await.unwrap().unwrap();
    assert_eq!(pending.status, SubmissionStatus::Pending);
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::InvoiceReady);

    // The next sweep after the outage settles it
    h.insurer.set_status_outage(false);
    h.insurer.set_claim_status(
        claim.claim_number.clone(),
        json!({"status": "received", "reference": "SHA-LATE-9"}),
    );
    h.insurer
        .set_claim_status("SHA-LATE-9", json!({"status": "received"}));
    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.pending_confirmed, 1);
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::Submitted);
}

#[tokio::test]
async fn test_reconciliation_fails_unknown_pending_attempt() {
    let h = harness();
    let claim = h.invoiced_claim(&[200]).await;
    let invoice = h
        .invoices
        .open_invoice_for_claim(claim.id)
        .await
        .unwrap()
        .unwrap();
    let log = SubmissionLog::pending_for_claim(claim.id, invoice.id, json!({}), 0, Uuid::new_v4());
    h.repo.begin_submission(&log).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.pending_failed, 1);

    let log = h.repo.find_submission_log(log.id).await.unwrap().unwrap();
    assert_eq!(log.status, SubmissionStatus::Failed);
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::InvoiceReady);
}

#[tokio::test]
async fn test_reconciliation_moves_status_forward_only() {
    let h = harness();
    let claim = h.invoiced_claim(&[500]).await;
    let result = h
        .gateway
        .submit_claim(claim.id, Uuid::new_v4())
        .await
        .unwrap();
    let reference = result.sha_reference.unwrap();

    h.insurer.set_claim_status(
        reference.clone(),
        json!({"status": "approved", "approved_amount": "450.00", "approval_date": "2024-07-01"}),
    );
    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.claims_updated, 1);
    let approved = h.claim(claim.id).await;
    assert_eq!(approved.status, ClaimStatus::Approved);
    assert_eq!(approved.approved_amount, Some(Decimal::new(45000, 2)));

    // Stale remote data never moves the claim back
    h.insurer
        .set_claim_status(reference.clone(), json!({"status": "rejected"}));
    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.claims_updated, 0);
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::Approved);

    h.insurer.set_claim_status(reference, json!({"status": "paid"}));
    h.reconciler.run().await.unwrap();
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::Paid);

    let reconciled = h
        .claims
        .audit_trail(claim.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.action == AuditAction::ClaimStatusReconciled)
        .count();
    assert_eq!(reconciled, 2);
}

#[tokio::test]
async fn test_rejected_claim_resubmits_with_new_revision() {
    let h = harness();
    let user = Uuid::new_v4();
    let claim = h.invoiced_claim(&[300]).await;
    let first = h.gateway.submit_claim(claim.id, user).await.unwrap();
    let first_reference = first.sha_reference.unwrap();

    h.insurer.set_claim_status(
        first_reference.clone(),
        json!({"status": "rejected", "rejection_reason": "Member number mismatch"}),
    );
    h.reconciler.run().await.unwrap();
    let rejected = h.claim(claim.id).await;
    assert_eq!(rejected.status, ClaimStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Member number mismatch")
    );

    h.claims
        .transition_status(claim.id, ClaimStatus::ReadyToSubmit, user, None)
        .await
        .unwrap();
    let revision = h.invoices.generate_invoice(claim.id, user).await.unwrap();
    assert_eq!(revision.revision, 2);

    let second = h.gateway.submit_claim(claim.id, user).await.unwrap();
    assert!(second.success);
    let second_reference = second.sha_reference.unwrap();
    assert_ne!(second_reference, first_reference);

    let resubmitted = h.claim(claim.id).await;
    assert_eq!(resubmitted.status, ClaimStatus::Submitted);
    assert_eq!(resubmitted.sha_reference.as_deref(), Some(first_reference.as_str()));
    let invoices = h.repo.invoices_for_claim(claim.id).await.unwrap();
    assert!(invoices
        .iter()
        .all(|invoice| invoice.status == InvoiceStatus::Submitted));
    assert_eq!(
        invoices[1].sha_reference.as_deref(),
        Some(second_reference.as_str())
    );

    // Reconciliation follows the latest revision's reference
    h.insurer
        .set_claim_status(second_reference, json!({"status": "approved"}));
    h.reconciler.run().await.unwrap();
    assert_eq!(h.claim(claim.id).await.status, ClaimStatus::Approved);
}

#[tokio::test]
async fn test_batch_completes_when_all_members_decided() {
    let h = harness();
    let (batch_id, _) = invoiced_batch(&h, 2).await;
    let result = h
        .gateway
        .submit_batch(batch_id, Uuid::new_v4())
        .await
        .unwrap();

    for claim in &result.claims {
        h.insurer
            .set_claim_status(claim.sha_reference.clone(), json!({"status": "approved"}));
    }
    let report = h.reconciler.run().await.unwrap();
    assert_eq!(report.claims_updated, 2);
    assert_eq!(report.batches_completed, 1);

    let batch = h.batches.get_batch(batch_id).await.unwrap();
    assert_eq!(batch.batch.status, BatchStatus::Completed);
}
