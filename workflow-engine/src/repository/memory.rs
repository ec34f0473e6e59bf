// In-memory repository backing tests and local tooling
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{WorkflowChange, WorkflowRepository};
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    ActivityEntry, PaymentTracking, StepStatus, WorkflowFilter, WorkflowStatistics,
    WorkflowStatus,
};
use crate::workflow::Workflow;

#[derive(Debug, Default)]
struct MemoryState {
    workflows: HashMap<Uuid, Workflow>,
    activity: Vec<ActivityEntry>,
    payments: Vec<PaymentTracking>,
}

#[derive(Debug, Default)]
pub struct MemoryWorkflowRepository {
    state: Mutex<MemoryState>,
}

impl MemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryWorkflowRepository {
    async fn insert_workflow(
        &self,
        workflow: &Workflow,
        activity: &[ActivityEntry],
    ) -> WorkflowResult<()> {
        let mut state = self.state.lock();
        let claim_id = workflow.instance.claim_id;
        if state
            .workflows
            .values()
            .any(|w| w.instance.claim_id == claim_id)
        {
            return Err(WorkflowError::AlreadyInitialized { claim_id });
        }
        state.workflows.insert(workflow.id(), workflow.clone());
        state.activity.extend_from_slice(activity);
        Ok(())
    }

    async fn find_workflow(&self, workflow_id: Uuid) -> WorkflowResult<Option<Workflow>> {
        Ok(self.state.lock().workflows.get(&workflow_id).cloned())
    }

    async fn find_by_claim(&self, claim_id: Uuid) -> WorkflowResult<Option<Workflow>> {
        Ok(self
            .state
            .lock()
            .workflows
            .values()
            .find(|w| w.instance.claim_id == claim_id)
            .cloned())
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>> {
        let state = self.state.lock();
        let mut workflows: Vec<Workflow> = state
            .workflows
            .values()
            .filter(|w| filter.matches(&w.instance))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| b.instance.created_at.cmp(&a.instance.created_at));

        let offset = usize::try_from(filter.offset.unwrap_or(0).max(0)).unwrap_or(0);
        let limit = filter
            .limit
            .and_then(|l| usize::try_from(l.max(0)).ok())
            .unwrap_or(usize::MAX);
        Ok(workflows.into_iter().skip(offset).take(limit).collect())
    }

    async fn save_workflow(&self, change: &WorkflowChange) -> WorkflowResult<()> {
        let mut state = self.state.lock();
        let workflow_id = change.instance.id;
        let stored = state
            .workflows
            .get_mut(&workflow_id)
            .ok_or_else(|| WorkflowError::not_found("Workflow", workflow_id))?;
        if stored.instance.updated_at != change.expected_updated_at {
            return Err(WorkflowError::Conflict(workflow_id));
        }

        stored.instance = change.instance.clone();
        for step in &change.steps {
            if let Some(slot) = stored.steps.iter_mut().find(|s| s.id == step.id) {
                *slot = step.clone();
            }
        }
        state.activity.extend(change.activity.iter().cloned());
        Ok(())
    }

    async fn activity(&self, workflow_id: Uuid) -> WorkflowResult<Vec<ActivityEntry>> {
        Ok(self
            .state
            .lock()
            .activity
            .iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn statistics(&self) -> WorkflowResult<WorkflowStatistics> {
        let state = self.state.lock();
        let mut by_status = BTreeMap::new();
        let mut step_failures = BTreeMap::new();
        let mut durations = Vec::new();

        for workflow in state.workflows.values() {
            *by_status
                .entry(workflow.status().to_string())
                .or_insert(0_i64) += 1;
            if workflow.status() == WorkflowStatus::Completed {
                if let (Some(started), Some(completed)) =
                    (workflow.instance.started_at, workflow.instance.completed_at)
                {
                    durations.push((completed - started).num_seconds() as f64 / 60.0);
                }
            }
            for step in workflow
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Failed)
            {
                *step_failures.entry(step.step_name.clone()).or_insert(0_i64) += 1;
            }
        }

        let average_completion_minutes = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Ok(WorkflowStatistics {
            total: i64::try_from(state.workflows.len()).unwrap_or(i64::MAX),
            by_status,
            average_completion_minutes,
            step_failures,
        })
    }

    async fn insert_payment_tracking(&self, record: &PaymentTracking) -> WorkflowResult<()> {
        self.state.lock().payments.push(record.clone());
        Ok(())
    }

    async fn payment_tracking_for_claim(
        &self,
        claim_id: Uuid,
    ) -> WorkflowResult<Vec<PaymentTracking>> {
        Ok(self
            .state
            .lock()
            .payments
            .iter()
            .filter(|p| p.claim_id == claim_id)
            .cloned()
            .collect())
    }
}
