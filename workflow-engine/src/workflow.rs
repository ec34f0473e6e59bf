use std::collections::HashMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    ActivityAction, ActivityEntry, StepStatus, WorkflowInstance, WorkflowStatus, WorkflowStep,
};
use crate::template::{successors, SHA_CLAIM_TEMPLATE, WORKFLOW_TYPE};

/// Current time at the precision Postgres keeps, so a timestamp read back
/// compares equal to the one written
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i32 {
    i32::try_from((to - from).num_minutes().max(0)).unwrap_or(i32::MAX)
}

/// Where the workflow stands after a step finished
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// A manual step was started
    Started(ActivityEntry),
    /// An automated step is runnable and waits for the automation worker
    Queued(String),
    /// Nothing is left to run; the workflow is completed
    Completed(ActivityEntry),
    /// Nothing runnable right now
    Waiting,
}

/// A workflow instance with its steps
///
/// All state transitions live here and work on the in-memory adjacency list
/// (`step_name -> prerequisites`). Each transition returns the activity
/// entry that must be persisted together with the new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(flatten)]
    pub instance: WorkflowInstance,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Fresh instance of the SHA template with every step pending
    pub fn from_template(claim_id: Uuid, initiated_by: Uuid, at: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        let steps = (1_i32..)
            .zip(SHA_CLAIM_TEMPLATE.iter())
            .map(|(order, template)| WorkflowStep {
                id: Uuid::new_v4(),
                workflow_id: id,
                step_name: template.name.to_string(),
                step_order: order,
                status: StepStatus::Pending,
                required: template.required,
                automated: template.automated,
                estimated_minutes: template.estimated_minutes,
                actual_minutes: None,
                assigned_to: None,
                completed_by: None,
                prerequisites: template.prerequisites.iter().map(|p| p.to_string()).collect(),
                next_steps: successors(template.name),
                notes: None,
                started_at: None,
                completed_at: None,
            })
            .collect();

        Self {
            instance: WorkflowInstance {
                id,
                claim_id,
                invoice_id: None,
                workflow_type: WORKFLOW_TYPE.to_string(),
                current_step: None,
                overall_status: WorkflowStatus::NotStarted,
                initiated_by,
                started_at: None,
                completed_at: None,
                created_at: at,
                updated_at: at,
            },
            steps,
        }
    }

    pub fn id(&self) -> Uuid {
        self.instance.id
    }

    pub fn status(&self) -> WorkflowStatus {
        self.instance.overall_status
    }

    pub fn step(&self, name: &str) -> WorkflowResult<&WorkflowStep> {
        self.steps
            .iter()
            .find(|s| s.step_name == name)
            .ok_or_else(|| WorkflowError::UnknownStep(name.to_string()))
    }

    fn step_mut(&mut self, name: &str) -> WorkflowResult<&mut WorkflowStep> {
        self.steps
            .iter_mut()
            .find(|s| s.step_name == name)
            .ok_or_else(|| WorkflowError::UnknownStep(name.to_string()))
    }

    fn statuses(&self) -> HashMap<&str, StepStatus> {
        self.steps
            .iter()
            .map(|s| (s.step_name.as_str(), s.status))
            .collect()
    }

    /// Prerequisites of `name` that are not yet completed
    pub fn unmet_prerequisites(&self, name: &str) -> WorkflowResult<Vec<String>> {
        let statuses = self.statuses();
        Ok(self
            .step(name)?
            .prerequisites
            .iter()
            .filter(|p| statuses.get(p.as_str()) != Some(&StepStatus::Completed))
            .cloned()
            .collect())
    }

    /// Pending steps whose prerequisites are all completed, in step order
    pub fn runnable_steps(&self) -> Vec<&WorkflowStep> {
        let statuses = self.statuses();
        let mut runnable: Vec<_> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .filter(|s| {
                s.prerequisites
                    .iter()
                    .all(|p| statuses.get(p.as_str()) == Some(&StepStatus::Completed))
            })
            .collect();
        runnable.sort_by_key(|s| s.step_order);
        runnable
    }

    /// First automated step ready to execute
    pub fn next_automated_step(&self) -> Option<&WorkflowStep> {
        if self.status() != WorkflowStatus::InProgress {
            return None;
        }
        self.runnable_steps().into_iter().find(|s| s.automated)
    }

    fn ensure_not_closed(&self) -> WorkflowResult<()> {
        let status = self.status();
        if status.is_closed() {
            return Err(WorkflowError::WorkflowClosed { status });
        }
        Ok(())
    }

    fn ensure_running(&self) -> WorkflowResult<()> {
        match self.status() {
            WorkflowStatus::InProgress => Ok(()),
            status => Err(WorkflowError::WorkflowClosed { status }),
        }
    }

    fn entry(
        &self,
        step: Option<&str>,
        action: ActivityAction,
        by: Uuid,
        details: serde_json::Value,
        at: DateTime<Utc>,
    ) -> ActivityEntry {
        ActivityEntry::new(self.id(), step, action, by, details, at)
    }

    /// Failed workflows resume once no failed step is left
    fn refresh_status(&mut self) {
        if self.status() == WorkflowStatus::Failed
            && !self.steps.iter().any(|s| s.status == StepStatus::Failed)
        {
            self.instance.overall_status = WorkflowStatus::InProgress;
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub fn begin(&mut self, by: Uuid, at: DateTime<Utc>) -> WorkflowResult<ActivityEntry> {
        if self.status() != WorkflowStatus::NotStarted {
            return Err(WorkflowError::WorkflowClosed {
                status: self.status(),
            });
        }
        self.instance.overall_status = WorkflowStatus::InProgress;
        self.instance.started_at = Some(at);
        self.instance.updated_at = at;
        Ok(self.entry(
            None,
            ActivityAction::WorkflowInitiated,
            by,
            json!({ "claim_id": self.instance.claim_id, "workflow_type": self.instance.workflow_type }),
            at,
        ))
    }

    /// `pending -> in_progress` once prerequisites are completed, or the
    /// human retry `failed -> in_progress`
    pub fn start_step(
        &mut self,
        name: &str,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> WorkflowResult<ActivityEntry> {
        let from = self.step(name)?.status;
        match from {
            StepStatus::Pending => self.ensure_running()?,
            StepStatus::Failed => self.ensure_not_closed()?,
            other => {
                return Err(WorkflowError::InvalidStepTransition {
                    step: name.to_string(),
                    from: other,
                    to: StepStatus::InProgress,
                })
            }
        }
        let missing = self.unmet_prerequisites(name)?;
        if !missing.is_empty() {
            return Err(WorkflowError::PrerequisitesNotMet {
                step: name.to_string(),
                missing,
            });
        }

        let step = self.step_mut(name)?;
        step.status = StepStatus::InProgress;
        step.assigned_to = Some(by);
        step.started_at = Some(at);
        step.completed_at = None;
        step.actual_minutes = None;

        self.instance.current_step = Some(name.to_string());
        self.instance.updated_at = at;
        self.refresh_status();
        Ok(self.entry(
            Some(name),
            ActivityAction::StepStarted,
            by,
            json!({ "assigned_to": by, "retry": from == StepStatus::Failed }),
            at,
        ))
    }

    pub fn complete_step(
        &mut self,
        name: &str,
        by: Uuid,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> WorkflowResult<ActivityEntry> {
        self.ensure_running()?;
        let step = self.step_mut(name)?;
        if step.status != StepStatus::InProgress {
            return Err(WorkflowError::InvalidStepTransition {
                step: name.to_string(),
                from: step.status,
                to: StepStatus::Completed,
            });
        }

        let actual_minutes = step.started_at.map(|started| elapsed_minutes(started, at));
        step.status = StepStatus::Completed;
        step.completed_by = Some(by);
        step.completed_at = Some(at);
        step.actual_minutes = actual_minutes;
        if notes.is_some() {
            step.notes = notes.clone();
        }

        self.instance.updated_at = at;
        Ok(self.entry(
            Some(name),
            ActivityAction::StepCompleted,
            by,
            json!({ "actual_minutes": actual_minutes, "notes": notes }),
            at,
        ))
    }

    /// Marks an in-progress step failed and freezes the workflow
    pub fn fail_step(
        &mut self,
        name: &str,
        by: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> WorkflowResult<ActivityEntry> {
        self.ensure_running()?;
        let step = self.step_mut(name)?;
        if step.status != StepStatus::InProgress {
            return Err(WorkflowError::InvalidStepTransition {
                step: name.to_string(),
                from: step.status,
                to: StepStatus::Failed,
            });
        }

        step.status = StepStatus::Failed;
        step.actual_minutes = step.started_at.map(|started| elapsed_minutes(started, at));
        step.notes = Some(reason.to_string());

        self.instance.overall_status = WorkflowStatus::Failed;
        self.instance.current_step = Some(name.to_string());
        self.instance.updated_at = at;
        Ok(self.entry(
            Some(name),
            ActivityAction::StepFailed,
            by,
            json!({ "error": reason }),
            at,
        ))
    }

    /// Human override for optional steps only
    pub fn skip_step(
        &mut self,
        name: &str,
        by: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> WorkflowResult<ActivityEntry> {
        self.ensure_not_closed()?;
        let step = self.step_mut(name)?;
        if step.required {
            return Err(WorkflowError::RequiredStep(name.to_string()));
        }
        match step.status {
            StepStatus::Pending | StepStatus::InProgress | StepStatus::Failed => {}
            from => {
                return Err(WorkflowError::InvalidStepTransition {
                    step: name.to_string(),
                    from,
                    to: StepStatus::Skipped,
                })
            }
        }

        step.status = StepStatus::Skipped;
        step.completed_by = Some(by);
        step.completed_at = Some(at);
        if reason.is_some() {
            step.notes = reason.clone();
        }

        self.instance.updated_at = at;
        self.refresh_status();
        Ok(self.entry(
            Some(name),
            ActivityAction::StepSkipped,
            by,
            json!({ "reason": reason }),
            at,
        ))
    }

    pub fn cancel(
        &mut self,
        by: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> WorkflowResult<ActivityEntry> {
        self.ensure_not_closed()?;
        let previous = self.status();
        self.instance.overall_status = WorkflowStatus::Cancelled;
        self.instance.updated_at = at;
        Ok(self.entry(
            None,
            ActivityAction::WorkflowCancelled,
            by,
            json!({ "reason": reason, "previous_status": previous }),
            at,
        ))
    }

    /// Start the next runnable step, or close the workflow when nothing is left
    ///
    /// Automated steps are left pending for the automation worker; manual
    /// steps are started and assigned to `by`.
    pub fn advance(&mut self, by: Uuid, at: DateTime<Utc>) -> WorkflowResult<Advance> {
        if self.status() != WorkflowStatus::InProgress {
            return Ok(Advance::Waiting);
        }
        let next = self
            .runnable_steps()
            .first()
            .map(|s| (s.step_name.clone(), s.automated));
        match next {
            Some((name, true)) => {
                self.instance.current_step = Some(name.clone());
                self.instance.updated_at = at;
                Ok(Advance::Queued(name))
            }
            Some((name, false)) => Ok(Advance::Started(self.start_step(&name, by, at)?)),
            None => Ok(self
                .try_complete(by, at)
                .map_or(Advance::Waiting, Advance::Completed)),
        }
    }

    /// Close the workflow if every required step is completed and no step
    /// is running, failed or waiting to run
    pub fn try_complete(&mut self, by: Uuid, at: DateTime<Utc>) -> Option<ActivityEntry> {
        if self.status() != WorkflowStatus::InProgress {
            return None;
        }
        let runnable: Vec<String> = self
            .runnable_steps()
            .iter()
            .map(|s| s.step_name.clone())
            .collect();
        let finished = self.steps.iter().all(|s| match s.status {
            StepStatus::Completed | StepStatus::Skipped => true,
            StepStatus::Pending => !s.required && !runnable.contains(&s.step_name),
            StepStatus::InProgress | StepStatus::Failed => false,
        });
        if !finished {
            return None;
        }

        self.instance.overall_status = WorkflowStatus::Completed;
        self.instance.completed_at = Some(at);
        self.instance.current_step = None;
        self.instance.updated_at = at;
        let duration_minutes = self
            .instance
            .started_at
            .map(|started| elapsed_minutes(started, at));
        Some(self.entry(
            None,
            ActivityAction::WorkflowCompleted,
            by,
            json!({ "duration_minutes": duration_minutes }),
            at,
        ))
    }

    /// Steps whose stored row differs from `before`
    pub fn changed_steps(&self, before: &Workflow) -> Vec<WorkflowStep> {
        self.steps
            .iter()
            .filter(|step| !before.steps.iter().any(|old| old == *step))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::*;

    fn started() -> Workflow {
        let at = now();
        let mut wf = Workflow::from_template(Uuid::new_v4(), Uuid::new_v4(), at);
        wf.begin(Uuid::new_v4(), at).unwrap();
        wf.start_step(CLAIM_CREATION, Uuid::new_v4(), at).unwrap();
        wf
    }

    fn finish(wf: &mut Workflow, name: &str) {
        let user = Uuid::new_v4();
        if wf.step(name).unwrap().status == StepStatus::Pending {
            wf.start_step(name, user, now()).unwrap();
        }
        wf.complete_step(name, user, None, now()).unwrap();
    }

    #[test]
    fn test_template_instance_shape() {
        let wf = Workflow::from_template(Uuid::new_v4(), Uuid::new_v4(), now());
        assert_eq!(wf.steps.len(), 9);
        assert_eq!(wf.status(), WorkflowStatus::NotStarted);
        assert!(wf.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(wf.step(INVOICE_REVIEW).unwrap().step_order, 6);
        assert_eq!(
            wf.step(INVOICE_REVIEW).unwrap().next_steps,
            vec![INVOICE_PRINTING.to_string()]
        );
    }

    #[test]
    fn test_start_requires_completed_prerequisites() {
        let mut wf = started();
        let err = wf
            .start_step(DOCUMENT_COLLECTION, Uuid::new_v4(), now())
            .unwrap_err();
        match err {
            WorkflowError::PrerequisitesNotMet { missing, .. } => {
                assert_eq!(missing, vec![CLINICAL_REVIEW.to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let mut wf = started();
        let err = wf
            .complete_step(CLINICAL_REVIEW, Uuid::new_v4(), None, now())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidStepTransition {
                from: StepStatus::Pending,
                to: StepStatus::Completed,
                ..
            }
        ));
        assert!(matches!(
            wf.complete_step("triage", Uuid::new_v4(), None, now()),
            Err(WorkflowError::UnknownStep(_))
        ));
    }

    #[test]
    fn test_advance_starts_manual_and_queues_automated() {
        let mut wf = started();
        let user = Uuid::new_v4();
        wf.complete_step(CLAIM_CREATION, user, Some("ok".into()), now())
            .unwrap();
        let advance = wf.advance(user, now()).unwrap();
        assert!(matches!(advance, Advance::Started(_)));
        assert_eq!(
            wf.step(CLINICAL_REVIEW).unwrap().status,
            StepStatus::InProgress
        );
        assert_eq!(wf.step(CLINICAL_REVIEW).unwrap().assigned_to, Some(user));

        finish(&mut wf, CLINICAL_REVIEW);
        finish(&mut wf, DOCUMENT_COLLECTION);
        let advance = wf.advance(user, now()).unwrap();
        assert_eq!(advance, Advance::Queued(COMPLIANCE_VERIFICATION.to_string()));
        assert_eq!(
            wf.step(COMPLIANCE_VERIFICATION).unwrap().status,
            StepStatus::Pending
        );
        assert_eq!(
            wf.next_automated_step().map(|s| s.step_name.as_str()),
            Some(COMPLIANCE_VERIFICATION)
        );
    }

    #[test]
    fn test_failed_step_freezes_until_retried() {
        let mut wf = started();
        for name in [CLAIM_CREATION, CLINICAL_REVIEW, DOCUMENT_COLLECTION] {
            finish(&mut wf, name);
        }
        let user = Uuid::new_v4();
        wf.start_step(COMPLIANCE_VERIFICATION, user, now()).unwrap();
        wf.fail_step(COMPLIANCE_VERIFICATION, user, "documents missing", now())
            .unwrap();

        assert_eq!(wf.status(), WorkflowStatus::Failed);
        assert!(wf.next_automated_step().is_none());
        assert_eq!(wf.advance(user, now()).unwrap(), Advance::Waiting);
        assert!(wf.try_complete(user, now()).is_none());

        let entry = wf.start_step(COMPLIANCE_VERIFICATION, user, now()).unwrap();
        assert_eq!(entry.details["retry"], json!(true));
        assert_eq!(wf.status(), WorkflowStatus::InProgress);
    }

    #[test]
    fn test_only_optional_steps_can_be_skipped() {
        let mut wf = started();
        assert!(matches!(
            wf.skip_step(CLINICAL_REVIEW, Uuid::new_v4(), None, now()),
            Err(WorkflowError::RequiredStep(_))
        ));
        wf.skip_step(PAYMENT_TRACKING, Uuid::new_v4(), Some("self-pay".into()), now())
            .unwrap();
        assert_eq!(wf.step(PAYMENT_TRACKING).unwrap().status, StepStatus::Skipped);
    }

    #[test]
    fn test_workflow_completes_after_last_step() {
        let mut wf = started();
        let user = Uuid::new_v4();
        for template in SHA_CLAIM_TEMPLATE.iter() {
            finish(&mut wf, template.name);
        }
        match wf.advance(user, now()).unwrap() {
            Advance::Completed(entry) => {
                assert_eq!(entry.action, ActivityAction::WorkflowCompleted)
            }
            other => panic!("unexpected advance: {other:?}"),
        }
        assert_eq!(wf.status(), WorkflowStatus::Completed);
        assert!(wf.instance.completed_at.is_some());
        assert!(matches!(
            wf.cancel(user, None, now()),
            Err(WorkflowError::WorkflowClosed {
                status: WorkflowStatus::Completed
            })
        ));
    }

    #[test]
    fn test_pending_optional_step_blocks_completion_while_runnable() {
        let mut wf = started();
        let user = Uuid::new_v4();
        for template in SHA_CLAIM_TEMPLATE.iter().filter(|t| t.required) {
            finish(&mut wf, template.name);
        }
        assert!(wf.try_complete(user, now()).is_none());
        wf.skip_step(PAYMENT_TRACKING, user, None, now()).unwrap();
        assert!(wf.try_complete(user, now()).is_some());
    }

    #[test]
    fn test_cancelled_workflow_rejects_step_changes() {
        let mut wf = started();
        let user = Uuid::new_v4();
        wf.cancel(user, Some("duplicate claim".into()), now()).unwrap();
        assert!(matches!(
            wf.complete_step(CLAIM_CREATION, user, None, now()),
            Err(WorkflowError::WorkflowClosed { .. })
        ));
        assert!(matches!(
            wf.skip_step(PAYMENT_TRACKING, user, None, now()),
            Err(WorkflowError::WorkflowClosed { .. })
        ));
    }

    #[test]
    fn test_changed_steps_only_reports_touched_rows() {
        let mut wf = started();
        let before = wf.clone();
        wf.complete_step(CLAIM_CREATION, Uuid::new_v4(), None, now())
            .unwrap();
        let changed = wf.changed_steps(&before);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].step_name, CLAIM_CREATION);
    }
}
