use std::sync::Arc;
use std::time::Duration;

use audit_engine::SYSTEM_ACTOR;
use chrono::Utc;
use claims_service::{
    ClaimStore, ClaimsRepository, ComplianceStatus, Diagnosis, InvoiceGenerator,
    MemoryClaimsRepository, NewClaim, NewClaimItem, DEFAULT_PAYMENT_TERMS_DAYS,
};
use rust_decimal::Decimal;
use uuid::Uuid;
use workflow_engine::{
    automation_queue, run_automation_worker, standard_actions, ActivityAction, DocumentRegister,
    DocumentType, DocumentVerification, MemoryDocumentStore, MemoryWorkflowRepository, NewDocument,
    StepStatus, VerificationStatus, Workflow, WorkflowEngine,
    WorkflowError, WorkflowFilter, WorkflowRepository, WorkflowStatus, CLAIM_CREATION,
    CLAIM_SUBMISSION, CLINICAL_REVIEW, COMPLIANCE_VERIFICATION, DOCUMENT_COLLECTION,
    INVOICE_GENERATION, INVOICE_PRINTING, INVOICE_REVIEW, PAYMENT_TRACKING,
};

struct Harness {
    claims: ClaimStore,
    invoices: InvoiceGenerator,
    documents: DocumentRegister,
    repo: Arc<MemoryWorkflowRepository>,
    engine: WorkflowEngine,
}

fn harness() -> Harness {
    let claims_repo: Arc<dyn ClaimsRepository> = Arc::new(MemoryClaimsRepository::new());
    let claims = ClaimStore::new(claims_repo.clone(), "CLINIC001");
    let invoices = InvoiceGenerator::new(claims_repo.clone(), DEFAULT_PAYMENT_TERMS_DAYS);
    let store = Arc::new(MemoryDocumentStore::new());
    let documents = DocumentRegister::new(store.clone(), claims_repo.clone());
    let repo = Arc::new(MemoryWorkflowRepository::new());
    let shared: Arc<dyn WorkflowRepository> = repo.clone();

    let engine = WorkflowEngine::new(shared.clone(), claims_repo).with_actions(standard_actions(
        claims.clone(),
        invoices.clone(),
        store,
        shared,
        Duration::from_secs(24 * 3600),
    ));

    Harness {
        claims,
        invoices,
        documents,
        repo,
        engine,
    }
}

async fn verified_documents(h: &Harness, claim_id: Uuid, count: usize) {
    let reviewer = Uuid::new_v4();
    for _ in 0..count {
        let document = h
            .documents
            .attach(
                claim_id,
                NewDocument {
                    document_type: DocumentType::InsuranceCard,
                    document_name: "member-card.jpg".into(),
                    description: None,
                    is_required: true,
                },
                reviewer,
            )
            .await
            .unwrap();
        h.documents
            .verify(
                document.id,
                DocumentVerification {
                    status: VerificationStatus::Verified,
                    notes: None,
                },
                reviewer,
            )
            .await
            .unwrap();
    }
}

async fn ready_claim(h: &Harness) -> Uuid {
    let detail = h
        .claims
        .create_claim(
            NewClaim {
                patient_id: Uuid::new_v4(),
                visit_id: Uuid::new_v4(),
                op_number: "OP-2231".into(),
                member_number: "135792468".into(),
                visit_date: Utc::now().date_naive(),
                primary_diagnosis: Diagnosis {
                    code: "J06.9".into(),
                    description: "Acute upper respiratory infection".into(),
                },
                secondary_diagnoses: vec![],
                items: vec![NewClaimItem {
                    service_type: "consultation".into(),
                    service_code: None,
                    description: "Consultation".into(),
                    quantity: 1,
                    unit_price: Decimal::new(1500, 0),
                    provided_by: None,
                    department: Some("OPD".into()),
                }],
                notes: None,
                draft: false,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    detail.claim.id
}

fn status(workflow: &Workflow, step: &str) -> StepStatus {
    workflow.step(step).unwrap().status
}

/// Walk the manual steps up to compliance verification
async fn through_documents(h: &Harness, workflow_id: Uuid, user: Uuid) -> Workflow {
    let mut workflow = None;
    for step in [CLAIM_CREATION, CLINICAL_REVIEW, DOCUMENT_COLLECTION] {
        workflow = Some(
            h.engine
                .complete_step(workflow_id, step, user, None, true)
                .await
                .unwrap(),
        );
    }
    workflow.unwrap()
}

#[tokio::test]
async fn test_initialize_starts_first_step() {
    let h = harness();
    let claim_id = ready_claim(&h).await;
    let user = Uuid::new_v4();

    let workflow = h.engine.initialize_workflow(claim_id, user).await.unwrap();
    assert_eq!(workflow.status(), WorkflowStatus::InProgress);
    assert_eq!(workflow.instance.workflow_type, "SHA_CLAIM_PROCESSING");
    assert_eq!(workflow.instance.current_step.as_deref(), Some(CLAIM_CREATION));
    assert_eq!(status(&workflow, CLAIM_CREATION), StepStatus::InProgress);
    assert_eq!(status(&workflow, CLINICAL_REVIEW), StepStatus::Pending);

    let activity = h.engine.activity(workflow.id()).await.unwrap();
    let actions: Vec<_> = activity.iter().map(|a| a.action).collect();
    assert_eq!(
        actions,
        vec![ActivityAction::WorkflowInitiated, ActivityAction::StepStarted]
    );

    let again = h.engine.initialize_workflow(claim_id, user).await;
    assert!(matches!(again, Err(WorkflowError::AlreadyInitialized { .. })));

    let missing = h.engine.initialize_workflow(Uuid::new_v4(), user).await;
    assert!(matches!(missing, Err(WorkflowError::Claims(_))));
}

#[tokio::test]
async fn test_full_workflow_runs_automated_steps() {
    let h = harness();
    let claim_id = ready_claim(&h).await;
    let user = Uuid::new_v4();
    verified_documents(&h, claim_id, 2).await;

    let workflow = h.engine.initialize_workflow(claim_id, user).await.unwrap();
    let id = workflow.id();
    let workflow = through_documents(&h, id, user).await;
    assert_eq!(status(&workflow, COMPLIANCE_VERIFICATION), StepStatus::Pending);
    assert_eq!(
        workflow.instance.current_step.as_deref(),
        Some(COMPLIANCE_VERIFICATION)
    );

    let report = h.engine.process_automated_steps(id, user).await.unwrap();
    assert_eq!(
        report.executed,
        vec![COMPLIANCE_VERIFICATION.to_string(), INVOICE_GENERATION.to_string()]
    );
    assert!(report.failed_step.is_none());

    let workflow = h.engine.get_workflow(id).await.unwrap();
    assert_eq!(status(&workflow, INVOICE_REVIEW), StepStatus::InProgress);
    let invoice = h
        .invoices
        .open_invoice_for_claim(claim_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(workflow.instance.invoice_id, Some(invoice.id));
    let claim = h.claims.get_claim(claim_id).await.unwrap().claim;
    assert_eq!(claim.compliance_status, ComplianceStatus::Verified);

    h.engine
        .complete_step(id, INVOICE_REVIEW, user, Some("Amounts match".into()), true)
        .await
        .unwrap();
    let printed = h
        .engine
        .record_external_completion(claim_id, INVOICE_PRINTING, user)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status(&printed, CLAIM_SUBMISSION), StepStatus::InProgress);

    let submitted = h
        .engine
        .record_external_completion(claim_id, CLAIM_SUBMISSION, user)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status(&submitted, PAYMENT_TRACKING), StepStatus::Pending);
    assert_eq!(submitted.status(), WorkflowStatus::InProgress);

    let report = h
        .engine
        .process_automated_steps(id, SYSTEM_ACTOR)
        .await
        .unwrap();
    assert_eq!(report.executed, vec![PAYMENT_TRACKING.to_string()]);
    assert_eq!(report.overall_status, WorkflowStatus::Completed);

    let tracking = h.repo.payment_tracking_for_claim(claim_id).await.unwrap();
    assert_eq!(tracking.len(), 1);
    assert!(tracking.iter().all(|t| t.auto_check_enabled));

    let activity = h.engine.activity(id).await.unwrap();
    assert_eq!(
        activity.last().map(|a| a.action),
        Some(ActivityAction::WorkflowCompleted)
    );
    let completed_steps = activity
        .iter()
        .filter(|a| a.action == ActivityAction::StepCompleted)
        .count();
    assert_eq!(completed_steps, 9);

    let stats = h.engine.statistics().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_status.get("completed"), Some(&1));
    assert!(stats.average_completion_minutes.is_some());
}

#[tokio::test]
async fn test_missing_documents_fail_and_freeze() {
    let h = harness();
    let claim_id = ready_claim(&h).await;
    let user = Uuid::new_v4();

    let id = h.engine.initialize_workflow(claim_id, user).await.unwrap().id();
    through_documents(&h, id, user).await;

    let report = h.engine.process_automated_steps(id, user).await.unwrap();
    assert!(report.executed.is_empty());
    assert_eq!(report.failed_step.as_deref(), Some(COMPLIANCE_VERIFICATION));
    assert_eq!(report.overall_status, WorkflowStatus::Failed);

    let workflow = h.engine.get_workflow(id).await.unwrap();
    assert_eq!(status(&workflow, COMPLIANCE_VERIFICATION), StepStatus::Failed);
    assert_eq!(status(&workflow, INVOICE_GENERATION), StepStatus::Pending);
    assert!(h
        .invoices
        .open_invoice_for_claim(claim_id)
        .await
        .unwrap()
        .is_none());

    // Frozen: another pass does nothing and manual progress is refused
    let again = h.engine.process_automated_steps(id, user).await.unwrap();
    assert!(again.executed.is_empty() && again.failed_step.is_none());
    let refused = h
        .engine
        .complete_step(id, COMPLIANCE_VERIFICATION, user, None, true)
        .await;
    assert!(matches!(refused, Err(WorkflowError::WorkflowClosed { .. })));

    let stats = h.engine.statistics().await.unwrap();
    assert_eq!(stats.step_failures.get(COMPLIANCE_VERIFICATION), Some(&1));

    // A human retries the step once the documents are in
    verified_documents(&h, claim_id, 1).await;
    let retried = h
        .engine
        .start_step(id, COMPLIANCE_VERIFICATION, user)
        .await
        .unwrap();
    assert_eq!(retried.status(), WorkflowStatus::InProgress);
    h.engine
        .complete_step(id, COMPLIANCE_VERIFICATION, user, Some("Checked by hand".into()), true)
        .await
        .unwrap();

    let report = h.engine.process_automated_steps(id, user).await.unwrap();
    assert_eq!(report.executed, vec![INVOICE_GENERATION.to_string()]);
}

#[tokio::test]
async fn test_skip_and_cancel_rules() {
    let h = harness();
    let user = Uuid::new_v4();

    let claim_id = ready_claim(&h).await;
    let id = h.engine.initialize_workflow(claim_id, user).await.unwrap().id();
    let skip_required = h.engine.skip_step(id, CLINICAL_REVIEW, user, None).await;
    assert!(matches!(skip_required, Err(WorkflowError::RequiredStep(_))));

    let skipped = h
        .engine
        .skip_step(id, PAYMENT_TRACKING, user, Some("Cash patient".into()))
        .await
        .unwrap();
    assert_eq!(status(&skipped, PAYMENT_TRACKING), StepStatus::Skipped);
    assert_eq!(skipped.status(), WorkflowStatus::InProgress);

    let cancelled = h
        .engine
        .cancel_workflow(id, user, Some("Claim withdrawn".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status(), WorkflowStatus::Cancelled);
    let refused = h.engine.complete_step(id, CLAIM_CREATION, user, None, true).await;
    assert!(matches!(
        refused,
        Err(WorkflowError::WorkflowClosed {
            status: WorkflowStatus::Cancelled
        })
    ));

    let filtered = h
        .engine
        .list_workflows(&WorkflowFilter {
            status: Some(WorkflowStatus::Cancelled),
            ..WorkflowFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert!(h
        .engine
        .list_workflows(&WorkflowFilter {
            status: Some(WorkflowStatus::InProgress),
            ..WorkflowFilter::default()
        })
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_external_completion_ignores_idle_steps() {
    let h = harness();
    let user = Uuid::new_v4();
    let claim_id = ready_claim(&h).await;

    assert!(h
        .engine
        .record_external_completion(claim_id, INVOICE_PRINTING, user)
        .await
        .unwrap()
        .is_none());

    h.engine.initialize_workflow(claim_id, user).await.unwrap();
    assert!(h
        .engine
        .record_external_completion(claim_id, INVOICE_PRINTING, user)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_manual_start_without_auto_advance() {
    let h = harness();
    let user = Uuid::new_v4();
    let claim_id = ready_claim(&h).await;
    let id = h.engine.initialize_workflow(claim_id, user).await.unwrap().id();

    let workflow = h
        .engine
        .complete_step(id, CLAIM_CREATION, user, None, false)
        .await
        .unwrap();
    assert_eq!(status(&workflow, CLINICAL_REVIEW), StepStatus::Pending);

    let early = h.engine.start_step(id, DOCUMENT_COLLECTION, user).await;
    assert!(matches!(early, Err(WorkflowError::PrerequisitesNotMet { .. })));

    let reviewer = Uuid::new_v4();
    let workflow = h
        .engine
        .start_step(id, CLINICAL_REVIEW, reviewer)
        .await
        .unwrap();
    let step = workflow.step(CLINICAL_REVIEW).unwrap();
    assert_eq!(step.status, StepStatus::InProgress);
    assert_eq!(step.assigned_to, Some(reviewer));
}

#[tokio::test]
async fn test_queue_worker_runs_runnable_steps() {
    let h = harness();
    let user = Uuid::new_v4();
    let claim_id = ready_claim(&h).await;
    verified_documents(&h, claim_id, 1).await;

    let (queue, receiver) = automation_queue(8);
    let engine = h.engine.clone().with_automation_queue(queue);
    let worker = tokio::spawn(run_automation_worker(engine.clone(), receiver));

    let id = engine.initialize_workflow(claim_id, user).await.unwrap().id();
    for step in [CLAIM_CREATION, CLINICAL_REVIEW, DOCUMENT_COLLECTION] {
        engine.complete_step(id, step, user, None, true).await.unwrap();
    }

    let reached_review = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let workflow = engine.get_workflow(id).await.unwrap();
            if status(&workflow, INVOICE_REVIEW) == StepStatus::InProgress {
                return workflow;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("automation worker did not run the automated steps");

    assert_eq!(status(&reached_review, COMPLIANCE_VERIFICATION), StepStatus::Completed);
    assert_eq!(status(&reached_review, INVOICE_GENERATION), StepStatus::Completed);
    worker.abort();
}
