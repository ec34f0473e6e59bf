//! SHA claim processing workflow
//!
//! Orchestrates the nine-step template that takes a claim from creation to
//! payment tracking:
//! - **Step state machine**: `pending -> in_progress -> {completed, failed, skipped}`,
//!   with prerequisites evaluated over an in-memory adjacency list
//! - **Automated steps**: compliance verification, invoice generation and
//!   payment tracking run through [`StepAction`]s, one at a time per workflow
//! - **Automation queue**: the engine queues a workflow whenever an automated
//!   step becomes runnable; [`run_automation_worker`] drains the queue
//! - **Activity log**: every transition is written together with its
//!   `sha_workflow_activity_log` entry
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use claims_service::{ClaimsRepository, MemoryClaimsRepository};
//! use workflow_engine::{MemoryWorkflowRepository, WorkflowEngine, WorkflowRepository};
//!
//! # async fn run(claim_id: uuid::Uuid, user: uuid::Uuid) -> workflow_engine::WorkflowResult<()> {
//! let claims: Arc<dyn ClaimsRepository> = Arc::new(MemoryClaimsRepository::new());
//! let repo: Arc<dyn WorkflowRepository> = Arc::new(MemoryWorkflowRepository::new());
//! let engine = WorkflowEngine::new(repo, claims);
//!
//! let workflow = engine.initialize_workflow(claim_id, user).await?;
//! engine
//!     .complete_step(workflow.id(), "claim_creation", user, None, true)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod automation;
pub mod documents;
pub mod engine;
pub mod error;
pub mod models;
pub mod repository;
pub mod template;
pub mod workflow;

pub use actions::*;
pub use automation::*;
pub use documents::*;
pub use engine::*;
pub use error::*;
pub use models::*;
pub use repository::*;
pub use template::*;
pub use workflow::*;
