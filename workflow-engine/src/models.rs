use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// STATUSES
// ============================================================================

/// Overall workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

database_layer::text_enum!(WorkflowStatus {
    NotStarted => "not_started",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl WorkflowStatus {
    /// No step changes are accepted once closed
    pub fn is_closed(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Cancelled)
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

database_layer::text_enum!(StepStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Skipped => "skipped",
    Failed => "failed",
});

// ============================================================================
// INSTANCES AND STEPS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub workflow_type: String,
    pub current_step: Option<String>,
    pub overall_status: WorkflowStatus,
    pub initiated_by: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_name: String,
    pub step_order: i32,
    pub status: StepStatus,
    pub required: bool,
    pub automated: bool,
    pub estimated_minutes: i32,
    pub actual_minutes: Option<i32>,
    pub assigned_to: Option<Uuid>,
    pub completed_by: Option<Uuid>,
    pub prerequisites: Vec<String>,
    pub next_steps: Vec<String>,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// ACTIVITY LOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    WorkflowInitiated,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepSkipped,
    WorkflowCompleted,
    WorkflowCancelled,
}

database_layer::text_enum!(ActivityAction {
    WorkflowInitiated => "WORKFLOW_INITIATED",
    StepStarted => "STEP_STARTED",
    StepCompleted => "STEP_COMPLETED",
    StepFailed => "STEP_FAILED",
    StepSkipped => "STEP_SKIPPED",
    WorkflowCompleted => "WORKFLOW_COMPLETED",
    WorkflowCancelled => "WORKFLOW_CANCELLED",
});

/// One row of `sha_workflow_activity_log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_name: Option<String>,
    pub action: ActivityAction,
    pub performed_by: Uuid,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        workflow_id: Uuid,
        step_name: Option<&str>,
        action: ActivityAction,
        performed_by: Uuid,
        details: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            step_name: step_name.map(str::to_string),
            action,
            performed_by,
            details,
            created_at,
        }
    }

    pub fn trace(&self) {
        tracing::info!(
            workflow_id = %self.workflow_id,
            step = self.step_name.as_deref().unwrap_or("-"),
            action = self.action.as_str(),
            performed_by = %self.performed_by,
            "Workflow activity"
        );
    }
}

// ============================================================================
// QUERIES AND REPORTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFilter {
    pub status: Option<WorkflowStatus>,
    pub claim_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl WorkflowFilter {
    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        self.status.map_or(true, |s| instance.overall_status == s)
            && self.claim_id.map_or(true, |c| instance.claim_id == c)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub total: i64,
    /// Instance count per overall status, keyed by the stored status text
    pub by_status: BTreeMap<String, i64>,
    /// Mean of `completed_at - started_at` over completed workflows
    pub average_completion_minutes: Option<f64>,
    /// Failed step count per step name
    pub step_failures: BTreeMap<String, i64>,
}

/// Recurring payment check created by the `payment_tracking` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTracking {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub workflow_id: Uuid,
    pub auto_check_enabled: bool,
    pub next_check_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_action_text() {
        assert_eq!(ActivityAction::StepCompleted.as_str(), "STEP_COMPLETED");
        assert_eq!(
            "WORKFLOW_CANCELLED".parse::<ActivityAction>(),
            Ok(ActivityAction::WorkflowCancelled)
        );
        assert_eq!(
            serde_json::to_value(ActivityAction::StepSkipped).unwrap(),
            serde_json::json!("STEP_SKIPPED")
        );
    }

    #[test]
    fn test_closed_statuses() {
        assert!(WorkflowStatus::Completed.is_closed());
        assert!(WorkflowStatus::Cancelled.is_closed());
        assert!(!WorkflowStatus::Failed.is_closed());
        assert!(!WorkflowStatus::InProgress.is_closed());
    }
}
