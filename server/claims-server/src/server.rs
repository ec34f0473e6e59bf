use std::sync::Arc;
use std::time::Instant;

use audit_engine::{DomainEventPublisher, TracingEventPublisher};
use claims_service::{
    BatchManager, ClaimStore, ClaimsRepository, ExportService, InvoiceGenerator,
    MemoryClaimsRepository, PgClaimsRepository,
};
use database_layer::{run_migrations, DatabasePool};
use error_common::PlatformError;
use insurance_service::{HttpInsurerClient, InsurerClient, Reconciler, SubmissionGateway};
use workflow_engine::{
    standard_actions, AutomationQueue, DocumentRegister, DocumentStore, MemoryDocumentStore,
    MemoryWorkflowRepository, PgDocumentStore, PgWorkflowRepository, WorkflowEngine,
    WorkflowRepository,
};

use crate::config::AppConfig;
use crate::middleware::JwtKeys;

/// Storage and external collaborators the services are built over
pub struct Backends {
    pub claims_repo: Arc<dyn ClaimsRepository>,
    pub workflow_repo: Arc<dyn WorkflowRepository>,
    pub documents: Arc<dyn DocumentStore>,
    pub insurer: Arc<dyn InsurerClient>,
    pub events: Arc<dyn DomainEventPublisher>,
    /// Present when running against Postgres; reported by `/health`
    pub db: Option<DatabasePool>,
}

impl Backends {
    /// In-process storage; used by the API tests and local runs without a database
    pub fn in_memory(insurer: Arc<dyn InsurerClient>) -> Self {
        Self {
            claims_repo: Arc::new(MemoryClaimsRepository::new()),
            workflow_repo: Arc::new(MemoryWorkflowRepository::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            insurer,
            events: Arc::new(TracingEventPublisher),
            db: None,
        }
    }

    /// Connect to Postgres, apply migrations and build the reqwest insurer client
    pub async fn connect(config: &AppConfig) -> Result<Self, PlatformError> {
        let db = DatabasePool::connect_with(&config.database.url, &config.pool_settings())
            .await
            .map_err(|e| PlatformError::DatabaseError(e.to_string()))?;
        run_migrations(db.pool())
            .await
            .map_err(|e| PlatformError::DatabaseError(e.to_string()))?;

        let insurer = HttpInsurerClient::new(config.insurer_settings())
            .map_err(|e| PlatformError::ConfigError(e.to_string()))?;

        Ok(Self {
            claims_repo: Arc::new(PgClaimsRepository::new(db.pool().clone())),
            workflow_repo: Arc::new(PgWorkflowRepository::new(db.pool().clone())),
            documents: Arc::new(PgDocumentStore::new(db.pool().clone())),
            insurer: Arc::new(insurer),
            events: Arc::new(TracingEventPublisher),
            db: Some(db),
        })
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub claims: ClaimStore,
    pub invoices: InvoiceGenerator,
    pub batches: BatchManager,
    pub documents: DocumentRegister,
    pub exports: ExportService,
    pub gateway: SubmissionGateway,
    pub reconciler: Reconciler,
    pub workflows: WorkflowEngine,
    pub jwt: JwtKeys,
    pub db: Option<DatabasePool>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every service over the given backends
    ///
    /// With a queue, the workflow engine enqueues workflows whose automated
    /// steps become runnable; without one, automation runs only through the
    /// explicit trigger endpoint.
    pub fn new(config: &AppConfig, backends: Backends, queue: Option<AutomationQueue>) -> Self {
        let Backends {
            claims_repo,
            workflow_repo,
            documents,
            insurer,
            events,
            db,
        } = backends;
        let provider_code = config.insurer.provider_code.clone();

        let claims = ClaimStore::new(claims_repo.clone(), provider_code.clone());
        let invoices = InvoiceGenerator::new(claims_repo.clone(), config.billing.payment_terms_days);
        let batches = BatchManager::new(claims_repo.clone());
        let document_register = DocumentRegister::new(documents.clone(), claims_repo.clone());
        let exports = ExportService::new(claims_repo.clone());
        let gateway = SubmissionGateway::new(
            claims_repo.clone(),
            insurer,
            events.clone(),
            provider_code,
            config.insurer_timeout(),
        );
        let reconciler = Reconciler::new(gateway.clone(), events, config.pending_timeout());

        let mut workflows = WorkflowEngine::new(workflow_repo.clone(), claims_repo).with_actions(
            standard_actions(
                claims.clone(),
                invoices.clone(),
                documents,
                workflow_repo,
                config.payment_check_interval(),
            ),
        );
        if let Some(queue) = queue {
            workflows = workflows.with_automation_queue(queue);
        }

        Self {
            claims,
            invoices,
            batches,
            documents: document_register,
            exports,
            gateway,
            reconciler,
            workflows,
            jwt: JwtKeys::new(&config.auth.jwt_secret),
            db,
            started_at: Instant::now(),
        }
    }
}
