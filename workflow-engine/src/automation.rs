// Automation task queue
use audit_engine::SYSTEM_ACTOR;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::engine::WorkflowEngine;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Sending side of the automation queue
#[derive(Debug, Clone)]
pub struct AutomationQueue {
    sender: mpsc::Sender<Uuid>,
}

impl AutomationQueue {
    /// Queue a workflow for an automation pass without waiting.
    /// Returns false when the queue is full or closed; the explicit trigger
    /// still works in that case.
    pub fn enqueue(&self, workflow_id: Uuid) -> bool {
        match self.sender.try_send(workflow_id) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(workflow_id = %workflow_id, "Automation queue full; pass not queued");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(workflow_id = %workflow_id, "Automation worker stopped; pass not queued");
                false
            }
        }
    }
}

pub fn automation_queue(capacity: usize) -> (AutomationQueue, mpsc::Receiver<Uuid>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (AutomationQueue { sender }, receiver)
}

/// Drain the queue, running each pass on its own task
///
/// Passes for the same workflow serialize on the engine's per-workflow lock.
pub async fn run_automation_worker(engine: WorkflowEngine, mut receiver: mpsc::Receiver<Uuid>) {
    while let Some(workflow_id) = receiver.recv().await {
        let engine = engine.clone();
        tokio::spawn(async move {
            match engine
                .process_automated_steps(workflow_id, SYSTEM_ACTOR)
                .await
            {
                Ok(report) => tracing::debug!(
                    workflow_id = %workflow_id,
                    executed = ?report.executed,
                    status = %report.overall_status,
                    "Automation pass finished"
                ),
                Err(err) => tracing::error!(
                    workflow_id = %workflow_id,
                    error = %err,
                    "Automation pass failed"
                ),
            }
        });
    }
    tracing::info!("Automation queue closed; worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_reports_full_queue() {
        let (queue, mut receiver) = automation_queue(1);
        let id = Uuid::new_v4();
        assert!(queue.enqueue(id));
        assert!(!queue.enqueue(Uuid::new_v4()));
        assert_eq!(receiver.recv().await, Some(id));
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_stopped() {
        let (queue, receiver) = automation_queue(4);
        drop(receiver);
        assert!(!queue.enqueue(Uuid::new_v4()));
    }
}
