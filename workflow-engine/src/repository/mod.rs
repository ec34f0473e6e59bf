// Workflow persistence
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WorkflowResult;
use crate::models::{
    ActivityEntry, PaymentTracking, WorkflowFilter, WorkflowInstance, WorkflowStatistics,
    WorkflowStep,
};
use crate::workflow::Workflow;

pub mod memory;
pub mod postgres;

pub use memory::MemoryWorkflowRepository;
pub use postgres::PgWorkflowRepository;

/// One state change of a workflow, written as a unit
///
/// `expected_updated_at` is the `updated_at` the change was computed from;
/// the write is refused with [`WorkflowError::Conflict`](crate::WorkflowError::Conflict)
/// when the stored instance has moved on.
#[derive(Debug, Clone)]
pub struct WorkflowChange {
    pub instance: WorkflowInstance,
    pub expected_updated_at: DateTime<Utc>,
    pub steps: Vec<WorkflowStep>,
    pub activity: Vec<ActivityEntry>,
}

impl WorkflowChange {
    pub fn between(before: &Workflow, after: &Workflow, activity: Vec<ActivityEntry>) -> Self {
        Self {
            instance: after.instance.clone(),
            expected_updated_at: before.instance.updated_at,
            steps: after.changed_steps(before),
            activity,
        }
    }
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Write a new instance, its steps and the initial activity.
    /// Fails with `AlreadyInitialized` when the claim already has one.
    async fn insert_workflow(
        &self,
        workflow: &Workflow,
        activity: &[ActivityEntry],
    ) -> WorkflowResult<()>;
    async fn find_workflow(&self, workflow_id: Uuid) -> WorkflowResult<Option<Workflow>>;
    async fn find_by_claim(&self, claim_id: Uuid) -> WorkflowResult<Option<Workflow>>;
    async fn list_workflows(&self, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>>;
    /// Apply instance, step and activity changes atomically
    async fn save_workflow(&self, change: &WorkflowChange) -> WorkflowResult<()>;
    async fn activity(&self, workflow_id: Uuid) -> WorkflowResult<Vec<ActivityEntry>>;
    async fn statistics(&self) -> WorkflowResult<WorkflowStatistics>;

    // Payment tracking

    async fn insert_payment_tracking(&self, record: &PaymentTracking) -> WorkflowResult<()>;
    async fn payment_tracking_for_claim(
        &self,
        claim_id: Uuid,
    ) -> WorkflowResult<Vec<PaymentTracking>>;
}
