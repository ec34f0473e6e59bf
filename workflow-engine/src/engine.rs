use std::collections::HashMap;
use std::sync::Arc;

use claims_service::{ClaimsError, ClaimsRepository};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::actions::{ActionContext, StepAction};
use crate::automation::AutomationQueue;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    ActivityEntry, StepStatus, WorkflowFilter, WorkflowStatistics, WorkflowStatus,
};
use crate::repository::{WorkflowChange, WorkflowRepository};
use crate::workflow::{now, Advance, Workflow};

/// Outcome of one automation pass over a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationReport {
    pub workflow_id: Uuid,
    /// Steps completed by this pass, in execution order
    pub executed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub overall_status: WorkflowStatus,
}

fn absorb(advance: Advance, activity: &mut Vec<ActivityEntry>) {
    match advance {
        Advance::Started(entry) | Advance::Completed(entry) => activity.push(entry),
        Advance::Queued(_) | Advance::Waiting => {}
    }
}

/// Workflow Engine
///
/// Every mutating operation takes the workflow's in-process lock, loads the
/// instance, applies the transition in memory and writes instance, steps and
/// activity in one repository call. The stored `updated_at` guards against
/// writers in other processes. Different workflows never wait on each other.
#[derive(Clone)]
pub struct WorkflowEngine {
    repo: Arc<dyn WorkflowRepository>,
    claims: Arc<dyn ClaimsRepository>,
    actions: HashMap<&'static str, Arc<dyn StepAction>>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    queue: Option<AutomationQueue>,
}

impl WorkflowEngine {
    pub fn new(repo: Arc<dyn WorkflowRepository>, claims: Arc<dyn ClaimsRepository>) -> Self {
        Self {
            repo,
            claims,
            actions: HashMap::new(),
            locks: Arc::new(DashMap::new()),
            queue: None,
        }
    }

    /// Bind an action to the step it names, replacing any earlier binding
    pub fn with_action(mut self, action: Arc<dyn StepAction>) -> Self {
        self.actions.insert(action.step(), action);
        self
    }

    pub fn with_actions(self, actions: impl IntoIterator<Item = Arc<dyn StepAction>>) -> Self {
        actions.into_iter().fold(self, Self::with_action)
    }

    /// Enqueue workflows here whenever an automated step becomes runnable
    pub fn with_automation_queue(mut self, queue: AutomationQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn repository(&self) -> &Arc<dyn WorkflowRepository> {
        &self.repo
    }

    async fn lock(&self, workflow_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(workflow_id).or_default().clone();
        lock.lock_owned().await
    }

    async fn load(&self, workflow_id: Uuid) -> WorkflowResult<Workflow> {
        self.repo
            .find_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Workflow", workflow_id))
    }

    async fn commit(
        &self,
        before: &Workflow,
        after: &Workflow,
        activity: Vec<ActivityEntry>,
    ) -> WorkflowResult<()> {
        self.repo
            .save_workflow(&WorkflowChange::between(before, after, activity))
            .await
    }

    fn notify(&self, workflow: &Workflow) {
        if let (Some(queue), Some(step)) = (&self.queue, workflow.next_automated_step()) {
            tracing::debug!(
                workflow_id = %workflow.id(),
                step = %step.step_name,
                "Automated step runnable; queued"
            );
            queue.enqueue(workflow.id());
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Instantiate the SHA template for a claim and start its first step
    pub async fn initialize_workflow(
        &self,
        claim_id: Uuid,
        initiated_by: Uuid,
    ) -> WorkflowResult<Workflow> {
        self.claims
            .find_claim(claim_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Claim", claim_id))?;
        if self.repo.find_by_claim(claim_id).await?.is_some() {
            return Err(WorkflowError::AlreadyInitialized { claim_id });
        }

        let at = now();
        let mut workflow = Workflow::from_template(claim_id, initiated_by, at);
        let mut activity = vec![workflow.begin(initiated_by, at)?];
        absorb(workflow.advance(initiated_by, at)?, &mut activity);
        self.repo.insert_workflow(&workflow, &activity).await?;

        tracing::info!(
            workflow_id = %workflow.id(),
            claim_id = %claim_id,
            "SHA claim workflow initialized"
        );
        Ok(workflow)
    }

    pub async fn start_step(
        &self,
        workflow_id: Uuid,
        step: &str,
        started_by: Uuid,
    ) -> WorkflowResult<Workflow> {
        let _guard = self.lock(workflow_id).await;
        let before = self.load(workflow_id).await?;
        let mut workflow = before.clone();
        let entry = workflow.start_step(step, started_by, now())?;
        self.commit(&before, &workflow, vec![entry]).await?;
        Ok(workflow)
    }

    /// Complete an in-progress step; with `auto_advance` the next runnable
    /// step is started, or the workflow is closed when none is left
    pub async fn complete_step(
        &self,
        workflow_id: Uuid,
        step: &str,
        completed_by: Uuid,
        notes: Option<String>,
        auto_advance: bool,
    ) -> WorkflowResult<Workflow> {
        let _guard = self.lock(workflow_id).await;
        let before = self.load(workflow_id).await?;
        let mut workflow = before.clone();
        let at = now();

        let mut activity = vec![workflow.complete_step(step, completed_by, notes, at)?];
        if auto_advance {
            absorb(workflow.advance(completed_by, at)?, &mut activity);
        } else {
            activity.extend(workflow.try_complete(completed_by, at));
        }
        self.commit(&before, &workflow, activity).await?;

        if workflow.status() == WorkflowStatus::Completed {
            tracing::info!(workflow_id = %workflow_id, "SHA claim workflow completed");
        }
        self.notify(&workflow);
        Ok(workflow)
    }

    pub async fn skip_step(
        &self,
        workflow_id: Uuid,
        step: &str,
        skipped_by: Uuid,
        reason: Option<String>,
    ) -> WorkflowResult<Workflow> {
        let _guard = self.lock(workflow_id).await;
        let before = self.load(workflow_id).await?;
        let mut workflow = before.clone();
        let at = now();

        let mut activity = vec![workflow.skip_step(step, skipped_by, reason, at)?];
        absorb(workflow.advance(skipped_by, at)?, &mut activity);
        self.commit(&before, &workflow, activity).await?;

        tracing::warn!(workflow_id = %workflow_id, step, "Workflow step skipped by override");
        self.notify(&workflow);
        Ok(workflow)
    }

    pub async fn cancel_workflow(
        &self,
        workflow_id: Uuid,
        cancelled_by: Uuid,
        reason: Option<String>,
    ) -> WorkflowResult<Workflow> {
        let _guard = self.lock(workflow_id).await;
        let before = self.load(workflow_id).await?;
        let mut workflow = before.clone();
        let entry = workflow.cancel(cancelled_by, reason, now())?;
        self.commit(&before, &workflow, vec![entry]).await?;

        tracing::info!(workflow_id = %workflow_id, "SHA claim workflow cancelled");
        Ok(workflow)
    }

    /// Complete a step whose work happened through another surface
    ///
    /// Returns `None` when the claim has no workflow or the step is not in
    /// progress; the caller's own operation has already succeeded either way.
    pub async fn record_external_completion(
        &self,
        claim_id: Uuid,
        step: &str,
        completed_by: Uuid,
    ) -> WorkflowResult<Option<Workflow>> {
        let Some(found) = self.repo.find_by_claim(claim_id).await? else {
            return Ok(None);
        };
        let workflow_id = found.id();

        let _guard = self.lock(workflow_id).await;
        let before = self.load(workflow_id).await?;
        let in_progress = before.status() == WorkflowStatus::InProgress
            && before.step(step)?.status == StepStatus::InProgress;
        if !in_progress {
            tracing::debug!(
                workflow_id = %workflow_id,
                step,
                "External completion ignored; step is not in progress"
            );
            return Ok(None);
        }

        let mut workflow = before.clone();
        let at = now();
        let mut activity = vec![workflow.complete_step(
            step,
            completed_by,
            Some("Completed outside the workflow".to_string()),
            at,
        )?];
        absorb(workflow.advance(completed_by, at)?, &mut activity);
        self.commit(&before, &workflow, activity).await?;

        self.notify(&workflow);
        Ok(Some(workflow))
    }

    // ------------------------------------------------------------------------
    // Automation
    // ------------------------------------------------------------------------

    /// Run runnable automated steps one at a time until none is left
    ///
    /// A failing action marks its step failed, which freezes the workflow;
    /// the pass stops there and a human has to retry or skip the step.
    pub async fn process_automated_steps(
        &self,
        workflow_id: Uuid,
        triggered_by: Uuid,
    ) -> WorkflowResult<AutomationReport> {
        let _guard = self.lock(workflow_id).await;
        let mut workflow = self.load(workflow_id).await?;
        let mut report = AutomationReport {
            workflow_id,
            executed: Vec::new(),
            failed_step: None,
            error: None,
            overall_status: workflow.status(),
        };

        while let Some(step) = workflow.next_automated_step().map(|s| s.step_name.clone()) {
            let before = workflow.clone();
            let entry = workflow.start_step(&step, triggered_by, now())?;
            self.commit(&before, &workflow, vec![entry]).await?;

            let ctx = ActionContext {
                workflow_id,
                claim_id: workflow.instance.claim_id,
                invoice_id: workflow.instance.invoice_id,
                triggered_by,
            };
            let result = match self.actions.get(step.as_str()) {
                Some(action) => action.execute(&ctx).await,
                None => Err(WorkflowError::AutomationFailed {
                    step: step.clone(),
                    reason: "no action is bound to this step".to_string(),
                }),
            };

            let before = workflow.clone();
            let at = now();
            match result {
                Ok(outcome) => {
                    if let Some(invoice_id) = outcome.invoice_id {
                        workflow.instance.invoice_id = Some(invoice_id);
                    }
                    let mut activity =
                        vec![workflow.complete_step(&step, triggered_by, outcome.notes, at)?];
                    absorb(workflow.advance(triggered_by, at)?, &mut activity);
                    self.commit(&before, &workflow, activity).await?;

                    tracing::info!(workflow_id = %workflow_id, step = %step, "Automated step completed");
                    report.executed.push(step);
                }
                Err(err) => {
                    let reason = err.to_string();
                    let entry = workflow.fail_step(&step, triggered_by, &reason, at)?;
                    self.commit(&before, &workflow, vec![entry]).await?;

                    tracing::warn!(
                        workflow_id = %workflow_id,
                        step = %step,
                        error = %reason,
                        "Automated step failed; workflow automation halted"
                    );
                    report.failed_step = Some(step);
                    report.error = Some(reason);
                    break;
                }
            }
        }

        report.overall_status = workflow.status();
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get_workflow(&self, workflow_id: Uuid) -> WorkflowResult<Workflow> {
        self.load(workflow_id).await
    }

    pub async fn get_workflow_by_claim(&self, claim_id: Uuid) -> WorkflowResult<Workflow> {
        self.repo
            .find_by_claim(claim_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Workflow for claim", claim_id))
    }

    pub async fn list_workflows(&self, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>> {
        self.repo.list_workflows(filter).await
    }

    pub async fn statistics(&self) -> WorkflowResult<WorkflowStatistics> {
        self.repo.statistics().await
    }

    pub async fn activity(&self, workflow_id: Uuid) -> WorkflowResult<Vec<ActivityEntry>> {
        self.load(workflow_id).await?;
        self.repo.activity(workflow_id).await
    }
}
