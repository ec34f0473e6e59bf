use claims_service::ClaimsError;
use database_layer::{DatabaseError, UnknownVariant};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{StepStatus, WorkflowStatus};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Workflow has no step named {0}")]
    UnknownStep(String),

    #[error("Step {step} cannot move from {from} to {to}")]
    InvalidStepTransition {
        step: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Step {step} is waiting on {}", .missing.join(", "))]
    PrerequisitesNotMet { step: String, missing: Vec<String> },

    #[error("Workflow is {status}; the requested change is not accepted")]
    WorkflowClosed { status: WorkflowStatus },

    #[error("A workflow already exists for claim {claim_id}")]
    AlreadyInitialized { claim_id: Uuid },

    #[error("Step {0} is required and cannot be skipped")]
    RequiredStep(String),

    #[error("Automated step {step} failed: {reason}")]
    AutomationFailed { step: String, reason: String },

    #[error("Workflow {0} was changed concurrently; reload and retry")]
    Conflict(Uuid),

    #[error(transparent)]
    Claims(#[from] ClaimsError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        match self {
            WorkflowError::Claims(err) => err.is_client_error(),
            WorkflowError::Persistence(_) => false,
            _ => true,
        }
    }
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        WorkflowError::Persistence(err.into())
    }
}

impl From<UnknownVariant> for WorkflowError {
    fn from(err: UnknownVariant) -> Self {
        WorkflowError::Persistence(err.into())
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
