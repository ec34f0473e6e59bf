// Domain events for downstream consumers
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Facts other systems may mirror; never read back by the claim workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ClaimSubmitted {
        claim_id: Uuid,
        claim_number: String,
        sha_reference: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<Uuid>,
    },
    InvoiceLocked {
        invoice_id: Uuid,
        invoice_number: String,
        claim_id: Uuid,
    },
    BatchSubmitted {
        batch_id: Uuid,
        batch_number: String,
        sha_batch_reference: String,
        total_claims: i32,
    },
    ClaimStatusReconciled {
        claim_id: Uuid,
        from: String,
        to: String,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ClaimSubmitted { .. } => "claim_submitted",
            DomainEvent::InvoiceLocked { .. } => "invoice_locked",
            DomainEvent::BatchSubmitted { .. } => "batch_submitted",
            DomainEvent::ClaimStatusReconciled { .. } => "claim_status_reconciled",
        }
    }
}

/// Sink for domain events. Implementations must not fail the caller.
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Default publisher: writes each event to the `domain_events` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

#[async_trait]
impl DomainEventPublisher for TracingEventPublisher {
    async fn publish(&self, event: DomainEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(
                target: "domain_events",
                event = event.name(),
                payload = %payload,
                "Domain event published"
            ),
            Err(e) => tracing::warn!(
                target: "domain_events",
                event = event.name(),
                error = %e,
                "Domain event could not be encoded"
            ),
        }
    }
}

/// Keeps every published event in memory; used by tests and local tooling
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl DomainEventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}
