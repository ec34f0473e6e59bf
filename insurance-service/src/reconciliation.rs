use std::sync::Arc;
use std::time::Duration;

use audit_engine::{AuditDetails, AuditEntry, DomainEvent, DomainEventPublisher, SYSTEM_ACTOR};
use chrono::{DateTime, Utc};
use claims_service::{
    BatchStatus, Claim, ClaimStatus, ClaimsError, ClaimsRepository, Invoice, RemoteStatusUpdate,
    SubmissionLog, SubmissionType, TransitionDriver,
};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayResult, InsurerError};
use crate::gateway::SubmissionGateway;
use crate::models::{BatchAck, RemoteClaimStatus, RemoteStatus, SubmissionAck};

/// Pending attempts older than this are treated as unconfirmed
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(300);

/// Summary of one reconciliation sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pending_checked: usize,
    pub pending_confirmed: usize,
    pub pending_failed: usize,
    pub claims_checked: usize,
    pub claims_updated: usize,
    pub batches_completed: usize,
    pub errors: Vec<String>,
}

/// What happened to one stale pending attempt
enum PendingOutcome {
    Confirmed,
    Failed,
    StillPending,
}

/// Insurer record found for a pending attempt
enum Remote {
    Claim(RemoteStatus),
    Batch(BatchAck),
}

/// Forward-only status the claim should move to, if any
///
/// `submitted < approved < paid`; `rejected` is reachable only from `submitted`.
pub fn forward_status(current: ClaimStatus, remote: RemoteClaimStatus) -> Option<ClaimStatus> {
    let to = match remote {
        RemoteClaimStatus::InReview => return None,
        RemoteClaimStatus::Approved => ClaimStatus::Approved,
        RemoteClaimStatus::Rejected => ClaimStatus::Rejected,
        RemoteClaimStatus::Paid => ClaimStatus::Paid,
    };
    current
        .allows(to, TransitionDriver::Reconciliation)
        .then_some(to)
}

/// Periodic correction of local submission state against the insurer
///
/// A sweep resolves submission attempts left `pending` past the timeout, then
/// polls every submitted or approved claim for its remote outcome, then closes
/// submitted batches whose members all have one. One claim's failure is
/// recorded in the report and does not stop the sweep. The sweep never moves
/// a claim backwards and never touches a locked invoice, so it is safe to run
/// alongside live submissions.
#[derive(Clone)]
pub struct Reconciler {
    gateway: SubmissionGateway,
    events: Arc<dyn DomainEventPublisher>,
    pending_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        gateway: SubmissionGateway,
        events: Arc<dyn DomainEventPublisher>,
        pending_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            events,
            pending_timeout,
        }
    }

    fn repo(&self) -> &Arc<dyn ClaimsRepository> {
        self.gateway.repository()
    }

    pub async fn run(&self) -> GatewayResult<ReconciliationReport> {
        let started_at = Utc::now();
        let mut report = ReconciliationReport {
            started_at: Some(started_at),
            ..ReconciliationReport::default()
        };

        let cutoff = started_at
            - chrono::Duration::from_std(self.pending_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        for log in self.repo().stale_pending_submissions(cutoff).await? {
            report.pending_checked += 1;
            match self.resolve_pending(&log).await {
                Ok(PendingOutcome::Confirmed) => report.pending_confirmed += 1,
                Ok(PendingOutcome::Failed) => report.pending_failed += 1,
                Ok(PendingOutcome::StillPending) => {}
                Err(err) => {
                    tracing::warn!(
                        submission_log_id = %log.id,
                        error = %err,
                        "Could not resolve pending submission"
                    );
                    report
                        .errors
                        .push(format!("submission log {}: {err}", log.id));
                }
            }
        }

        for claim in self.repo().claims_awaiting_outcome().await? {
            report.claims_checked += 1;
            match self.reconcile_claim(&claim).await {
                Ok(true) => report.claims_updated += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        claim_id = %claim.id,
                        claim_number = %claim.claim_number,
                        error = %err,
                        "Could not reconcile claim status"
                    );
                    report
                        .errors
                        .push(format!("claim {}: {err}", claim.claim_number));
                }
            }
        }

        for batch in self.repo().list_batches(Some(BatchStatus::Submitted)).await? {
            match self.repo().complete_batch(batch.id).await {
                Ok(true) => {
                    tracing::info!(
                        batch_id = %batch.id,
                        batch_number = %batch.batch_number,
                        "Batch completed; every member claim has an outcome"
                    );
                    report.batches_completed += 1;
                }
                Ok(false) => {}
                Err(err) => report
                    .errors
                    .push(format!("batch {}: {err}", batch.batch_number)),
            }
        }

        report.finished_at = Some(Utc::now());
        tracing::info!(
            pending_checked = report.pending_checked,
            pending_confirmed = report.pending_confirmed,
            pending_failed = report.pending_failed,
            claims_checked = report.claims_checked,
            claims_updated = report.claims_updated,
            batches_completed = report.batches_completed,
            errors = report.errors.len(),
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Ask the insurer whether an unconfirmed attempt reached it
    async fn resolve_pending(&self, log: &SubmissionLog) -> GatewayResult<PendingOutcome> {
        let lookup = match log.submission_type {
            SubmissionType::Single => {
                let claim_id = log.claim_id.ok_or_else(|| {
                    ClaimsError::Validation(format!("Submission log {} has no claim", log.id))
                })?;
                let claim = self
                    .repo()
                    .find_claim(claim_id)
                    .await?
                    .ok_or_else(|| ClaimsError::not_found("Claim", claim_id))?;
                self.gateway
                    .remote_claim_status(&claim.claim_number)
                    .await
                    .map(Remote::Claim)
            }
            SubmissionType::Batch => {
                let batch_id = log.batch_id.ok_or_else(|| {
                    ClaimsError::Validation(format!("Submission log {} has no batch", log.id))
                })?;
                let batch = self
                    .repo()
                    .find_batch(batch_id)
                    .await?
                    .ok_or_else(|| ClaimsError::not_found("Batch", batch_id))?;
                self.gateway
                    .remote_batch_status(&batch.batch_number)
                    .await
                    .map(Remote::Batch)
            }
        };

        match lookup {
            Ok(Remote::Claim(remote)) => {
                let reference = remote.reference.clone().ok_or_else(|| {
                    InsurerError::MalformedResponse("claim status without a reference".into())
                })?;
                let invoices = match log.claim_id {
                    Some(claim_id) => self.repo().invoices_for_claim(claim_id).await?,
                    None => Vec::new(),
                };
                if let Some(reason) = foreign_record(log, &remote, &reference, &invoices) {
                    tracing::warn!(
                        submission_log_id = %log.id,
                        sha_reference = %reference,
                        reason = %reason,
                        "Insurer record belongs to another attempt; pending submission failed"
                    );
                    self.gateway
                        .record_failure(
                            log,
                            &format!("Insurer has no record of this attempt: {reason}"),
                            Some(remote.body),
                        )
                        .await?;
                    return Ok(PendingOutcome::Failed);
                }
                self.gateway
                    .confirm_claim(
                        log,
                        SubmissionAck {
                            reference,
                            body: remote.body,
                        },
                    )
                    .await?;
                tracing::info!(submission_log_id = %log.id, "Pending claim submission confirmed by insurer");
                Ok(PendingOutcome::Confirmed)
            }
            Ok(Remote::Batch(ack)) => {
                self.gateway.confirm_batch(log, ack).await?;
                tracing::info!(submission_log_id = %log.id, "Pending batch submission confirmed by insurer");
                Ok(PendingOutcome::Confirmed)
            }
            Err(InsurerError::NotFound(what)) => {
                self.gateway
                    .record_failure(
                        log,
                        &format!("Insurer has no record of {what} after the pending timeout"),
                        None,
                    )
                    .await?;
                Ok(PendingOutcome::Failed)
            }
            Err(err) => {
                tracing::warn!(
                    submission_log_id = %log.id,
                    error = %err,
                    "Insurer unreachable; pending submission left for the next sweep"
                );
                Ok(PendingOutcome::StillPending)
            }
        }
    }

    /// Poll one claim and advance it if the insurer has decided
    async fn reconcile_claim(&self, claim: &Claim) -> GatewayResult<bool> {
        // Later revisions carry their own reference; the claim keeps the first
        let reference = self
            .repo()
            .invoices_for_claim(claim.id)
            .await?
            .into_iter()
            .rev()
            .find_map(|invoice| invoice.sha_reference)
            .or_else(|| claim.sha_reference.clone());
        let Some(reference) = reference else {
            return Ok(false);
        };

        let remote = self.gateway.remote_claim_status(&reference).await?;
        let Some(to) = forward_status(claim.status, remote.status) else {
            tracing::debug!(
                claim_id = %claim.id,
                status = %claim.status,
                remote_status = remote.status.as_str(),
                "No forward change from insurer"
            );
            return Ok(false);
        };

        let update = self.remote_update(claim, to, &remote);
        if !self.repo().apply_remote_status(&update).await? {
            return Ok(false);
        }

        tracing::info!(
            claim_id = %claim.id,
            claim_number = %claim.claim_number,
            from = %claim.status,
            to = %to,
            "Claim status reconciled with insurer"
        );
        self.events
            .publish(DomainEvent::ClaimStatusReconciled {
                claim_id: claim.id,
                from: claim.status.to_string(),
                to: to.to_string(),
            })
            .await;
        Ok(true)
    }

    fn remote_update(
        &self,
        claim: &Claim,
        to: ClaimStatus,
        remote: &RemoteStatus,
    ) -> RemoteStatusUpdate {
        let approved_amount = match to {
            ClaimStatus::Approved | ClaimStatus::Paid => remote.approved_amount,
            _ => None,
        };
        let approval_date = match to {
            ClaimStatus::Approved | ClaimStatus::Paid => {
                remote.approval_date.or_else(|| Some(Utc::now()))
            }
            _ => None,
        };
        let rejection_reason = match to {
            ClaimStatus::Rejected => remote.rejection_reason.clone(),
            _ => None,
        };

        RemoteStatusUpdate {
            claim_id: claim.id,
            from: claim.status,
            to,
            approved_amount,
            approval_date: if claim.approval_date.is_some() {
                None
            } else {
                approval_date
            },
            rejection_reason: rejection_reason.clone(),
            audit: AuditEntry::new(
                claim.id,
                SYSTEM_ACTOR,
                AuditDetails::StatusReconciled {
                    from: claim.status.to_string(),
                    to: to.to_string(),
                    remote_status: remote.status.as_str().to_string(),
                    approved_amount,
                    rejection_reason,
                },
            ),
        }
    }
}

/// Why the insurer's record for a claim cannot confirm `log`, if it cannot
///
/// The status lookup is keyed by claim number, so after a rejection it can
/// still answer with the earlier revision's record. A reference already held
/// by another invoice revision never confirms this one.
fn foreign_record(
    log: &SubmissionLog,
    remote: &RemoteStatus,
    reference: &str,
    invoices: &[Invoice],
) -> Option<String> {
    if let Some(held) = invoices
        .iter()
        .find(|i| Some(i.id) != log.invoice_id && i.sha_reference.as_deref() == Some(reference))
    {
        return Some(format!(
            "reference {reference} already belongs to invoice {} revision {}",
            held.invoice_number, held.revision
        ));
    }

    let attempted = invoices
        .iter()
        .find(|i| Some(i.id) == log.invoice_id)
        .map(|i| i.invoice_number.as_str())
        .or_else(|| log.request_payload.get("invoice_number").and_then(|v| v.as_str()));
    match (remote.invoice_number.as_deref(), attempted) {
        (Some(registered), Some(sent)) if registered != sent => Some(format!(
            "insurer registered invoice {registered}, this attempt sent {sent}"
        )),
        _ => None,
    }
}

/// Drive [`Reconciler::run`] on a fixed interval until the task is aborted
pub async fn run_periodically(reconciler: Reconciler, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let Err(err) = reconciler.run().await {
            tracing::error!(error = %err, "Reconciliation sweep failed");
        }
    }
}
