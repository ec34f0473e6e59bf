use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::handlers::{
    batches, claims, documents, exports, health, invoices, reconciliation, workflows,
};
use crate::server::AppState;

/// Route paths, relative to the `/api/v1` prefix unless noted
pub mod paths {
    pub const API_V1: &str = "/api/v1";

    /// Mounted at the root, outside the API prefix
    pub const HEALTH: &str = "/health";

    pub mod claims {
        pub const CLAIMS: &str = "/claims";
        pub const CLAIM_BY_ID: &str = "/claims/:id";
        pub const CLAIM_STATUS: &str = "/claims/:id/status";
        pub const CLAIM_SUBMISSIONS: &str = "/claims/:id/submissions";
    }

    pub mod invoices {
        pub const INVOICES: &str = "/sha-invoices";
        pub const INVOICE_BY_ID: &str = "/sha-invoices/:id";
        pub const PRINT: &str = "/sha-invoices/:id/print";
        pub const AUDIT: &str = "/sha-invoices/:id/audit";
        pub const GENERATE: &str = "/sha-invoices/generate/:claim_id";
        pub const GENERATE_BATCH: &str = "/sha-invoices/generate/batch/:batch_id";
        pub const SUBMIT: &str = "/sha-invoices/submit/:claim_id";
        pub const READY_FOR_REVIEW: &str = "/sha-invoices/ready-for-review";
        pub const SUBMITTED_ARCHIVE: &str = "/sha-invoices/submitted-archive";
        pub const READY_FOR_PRINTING: &str = "/sha-invoices/ready-for-printing/:batch_type";
        pub const COMPLIANCE_REPORT: &str = "/sha-invoices/compliance/report";
    }

    pub mod batches {
        pub const BATCHES: &str = "/sha-batches";
        pub const BATCH_BY_ID: &str = "/sha-batches/:id";
        pub const SUBMIT: &str = "/sha-batches/:id/submit";
    }

    pub mod workflows {
        pub const WORKFLOWS: &str = "/sha-workflows";
        pub const STATISTICS: &str = "/sha-workflows/statistics";
        pub const WORKFLOW_BY_ID: &str = "/sha-workflows/:id";
        pub const BY_CLAIM: &str = "/sha-workflows/claim/:claim_id";
        pub const START_STEP: &str = "/sha-workflows/:id/steps/:step/start";
        pub const COMPLETE_STEP: &str = "/sha-workflows/:id/steps/:step/complete";
        pub const SKIP_STEP: &str = "/sha-workflows/:id/steps/:step/skip";
        pub const AUTOMATION: &str = "/sha-workflows/:id/automation";
        pub const CANCEL: &str = "/sha-workflows/:id/cancel";
        pub const ACTIVITY: &str = "/sha-workflows/:id/activity";
    }

    pub mod documents {
        pub const BY_CLAIM: &str = "/sha-documents/claim/:claim_id";
        pub const DOCUMENT_BY_ID: &str = "/sha-documents/:id";
        pub const VERIFY: &str = "/sha-documents/:id/verify";
    }

    pub mod exports {
        pub const BATCH_REPORT: &str = "/sha-exports/batch/:batch_id/report";
        pub const CLAIMS_CSV: &str = "/sha-exports/claims/csv";
    }

    pub mod reconciliation {
        pub const RUN: &str = "/sha-reconciliation/run";
    }
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route(paths::HEALTH, get(health::health_check))
}

pub fn claim_routes() -> Router<AppState> {
    Router::new()
        .route(
            paths::claims::CLAIMS,
            get(claims::list_claims).post(claims::create_claim),
        )
        .route(
            paths::claims::CLAIM_BY_ID,
            get(claims::get_claim).delete(claims::delete_claim),
        )
        .route(paths::claims::CLAIM_STATUS, patch(claims::update_claim_status))
        .route(paths::claims::CLAIM_SUBMISSIONS, get(claims::claim_submissions))
}

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route(paths::invoices::INVOICES, get(invoices::list_invoices))
        .route(
            paths::invoices::INVOICE_BY_ID,
            get(invoices::get_invoice).patch(invoices::update_invoice),
        )
        .route(paths::invoices::PRINT, patch(invoices::print_invoice))
        .route(paths::invoices::AUDIT, get(invoices::invoice_audit))
        .route(paths::invoices::GENERATE, post(invoices::generate_invoice))
        .route(
            paths::invoices::GENERATE_BATCH,
            post(invoices::generate_batch_invoices),
        )
        .route(paths::invoices::SUBMIT, post(invoices::submit_claim))
        .route(paths::invoices::READY_FOR_REVIEW, get(invoices::ready_for_review))
        .route(
            paths::invoices::SUBMITTED_ARCHIVE,
            get(invoices::submitted_archive),
        )
        .route(
            paths::invoices::READY_FOR_PRINTING,
            get(invoices::ready_for_printing),
        )
        .route(
            paths::invoices::COMPLIANCE_REPORT,
            get(invoices::compliance_report),
        )
}

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route(
            paths::batches::BATCHES,
            get(batches::list_batches).post(batches::create_batch),
        )
        .route(
            paths::batches::BATCH_BY_ID,
            get(batches::get_batch).delete(batches::delete_batch),
        )
        .route(paths::batches::SUBMIT, patch(batches::submit_batch))
}

pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route(
            paths::workflows::WORKFLOWS,
            get(workflows::list_workflows).post(workflows::initialize_workflow),
        )
        .route(
            paths::workflows::STATISTICS,
            get(workflows::workflow_statistics),
        )
        .route(paths::workflows::WORKFLOW_BY_ID, get(workflows::get_workflow))
        .route(paths::workflows::BY_CLAIM, get(workflows::workflow_by_claim))
        .route(paths::workflows::START_STEP, post(workflows::start_step))
        .route(paths::workflows::COMPLETE_STEP, post(workflows::complete_step))
        .route(paths::workflows::SKIP_STEP, post(workflows::skip_step))
        .route(
            paths::workflows::AUTOMATION,
            post(workflows::process_automation),
        )
        .route(paths::workflows::CANCEL, post(workflows::cancel_workflow))
        .route(paths::workflows::ACTIVITY, get(workflows::workflow_activity))
}

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route(
            paths::documents::BY_CLAIM,
            get(documents::claim_documents).post(documents::attach_document),
        )
        .route(
            paths::documents::DOCUMENT_BY_ID,
            delete(documents::delete_document),
        )
        .route(paths::documents::VERIFY, patch(documents::verify_document))
}

pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route(paths::exports::BATCH_REPORT, get(exports::batch_report))
        .route(paths::exports::CLAIMS_CSV, get(exports::claims_csv))
}

pub fn reconciliation_routes() -> Router<AppState> {
    Router::new().route(
        paths::reconciliation::RUN,
        post(reconciliation::run_reconciliation),
    )
}

/// Every authenticated route, to be nested under [`paths::API_V1`]
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(claim_routes())
        .merge(invoice_routes())
        .merge(batch_routes())
        .merge(workflow_routes())
        .merge(document_routes())
        .merge(export_routes())
        .merge(reconciliation_routes())
}
