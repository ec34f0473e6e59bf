use axum::{extract::State, http::StatusCode, Json};
use audit_engine::AuditEntry;
use chrono::NaiveDate;
use claims_service::{
    BatchInvoiceResult, BatchType, ComplianceReport, Invoice, InvoiceFilter, InvoiceStatus,
    InvoiceUpdate,
};
use insurance_service::SubmissionResult;
use serde::Deserialize;
use uuid::Uuid;
use workflow_engine::INVOICE_PRINTING;

use crate::error::{api_failure, api_success, ApiError, ApiResponse};
use crate::handlers::mark_submitted;
use crate::middleware::{roles, AuthContext};
use crate::server::AppState;
use crate::types::{ApiJson, ApiPath, ApiQuery, PaginationParams};

#[derive(Debug, Deserialize, Default)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
    pub claim_id: Option<Uuid>,
    pub invoice_from: Option<NaiveDate>,
    pub invoice_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Inclusive date range used by the archive and the compliance report
#[derive(Debug, Deserialize, Default)]
pub struct DateRangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateRangeQuery {
    fn validate(&self) -> Result<(), ApiError> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => Err(ApiError::validation(
                "start_date must not be after end_date",
            )),
            _ => Ok(()),
        }
    }
}

/// Generate the pre-submission invoice for a ready claim
pub async fn generate_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<Invoice>>), ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let invoice = state.invoices.generate_invoice(claim_id, auth.user_id).await?;
    let message = format!("Invoice {} generated", invoice.invoice_number);
    Ok((StatusCode::CREATED, Json(api_success(message, invoice))))
}

/// Generate invoices for every ready member of a batch
pub async fn generate_batch_invoices(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(batch_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<BatchInvoiceResult>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let result = state
        .invoices
        .generate_for_batch(batch_id, auth.user_id)
        .await?;
    let message = format!(
        "{} invoices generated, {} failed",
        result.generated.len(),
        result.failed.len()
    );
    Ok(Json(api_success(message, result)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiQuery(query): ApiQuery<ListInvoicesQuery>,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, ApiError> {
    let pagination = PaginationParams {
        page: query.page,
        page_size: query.page_size,
    };
    let filter = InvoiceFilter {
        statuses: query.status.into_iter().collect(),
        claim_id: query.claim_id,
        invoice_from: query.invoice_from,
        invoice_to: query.invoice_to,
        search: query.search.filter(|s| !s.trim().is_empty()),
        ..InvoiceFilter::default()
    };

    // The invoice listing has no separate count query; page over the full match
    let all = state.invoices.list_invoices(&filter).await?;
    let total = i64::try_from(all.len()).unwrap_or(i64::MAX);
    let page: Vec<Invoice> = all
        .into_iter()
        .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(pagination.limit()).unwrap_or(usize::MAX))
        .collect();

    Ok(Json(pagination.wrap_response(
        format!("{} invoices", page.len()),
        page,
        total,
    )))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(invoice_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    let invoice = state.invoices.get_invoice(invoice_id).await?;
    Ok(Json(api_success("Invoice retrieved", invoice)))
}

/// Edit due date or notes before submission
pub async fn update_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(invoice_id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<InvoiceUpdate>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let invoice = state
        .invoices
        .update_invoice(invoice_id, update, auth.user_id)
        .await?;
    Ok(Json(api_success("Invoice updated", invoice)))
}

/// Mark an invoice printed and complete the workflow's printing step
pub async fn print_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(invoice_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let invoice = state.invoices.mark_printed(invoice_id, auth.user_id).await?;
    if let Err(err) = state
        .workflows
        .record_external_completion(invoice.claim_id, INVOICE_PRINTING, auth.user_id)
        .await
    {
        tracing::warn!(
            invoice_number = %invoice.invoice_number,
            error = %err,
            "Printing not recorded on workflow"
        );
    }

    let message = format!("Invoice {} marked as printed", invoice.invoice_number);
    Ok(Json(api_success(message, invoice)))
}

/// Submit one invoiced claim to the insurer
///
/// A rejected or timed-out submission answers 400 with the attempt's result,
/// so the caller keeps the submission log id and can retry.
pub async fn submit_claim(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(claim_id): ApiPath<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<SubmissionResult>>), ApiError> {
    auth.require_any_role(roles::BILLING)?;

    let result = state.gateway.submit_claim(claim_id, auth.user_id).await?;
    if !result.success {
        let message = result
            .error
            .clone()
            .unwrap_or_else(|| "Submission failed".to_string());
        return Ok((StatusCode::BAD_REQUEST, Json(api_failure(message, result))));
    }

    mark_submitted(&state, claim_id, auth.user_id).await;
    let message = format!(
        "Claim submitted to SHA with reference {}",
        result.sha_reference.as_deref().unwrap_or("-")
    );
    Ok((StatusCode::OK, Json(api_success(message, result))))
}

pub async fn ready_for_review(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, ApiError> {
    let invoices = state.invoices.ready_for_review().await?;
    Ok(Json(api_success(
        format!("{} invoices awaiting review", invoices.len()),
        invoices,
    )))
}

pub async fn submitted_archive(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiQuery(range): ApiQuery<DateRangeQuery>,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, ApiError> {
    range.validate()?;
    let invoices = state
        .invoices
        .submitted_archive(range.start_date, range.end_date)
        .await?;
    Ok(Json(api_success(
        format!("{} submitted invoices", invoices.len()),
        invoices,
    )))
}

pub async fn ready_for_printing(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(batch_type): ApiPath<BatchType>,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, ApiError> {
    if batch_type == BatchType::Custom {
        return Err(ApiError::validation(
            "Printing queues exist only for weekly and monthly periods",
        ));
    }
    let invoices = state.invoices.ready_for_printing(batch_type).await?;
    Ok(Json(api_success(
        format!("{} invoices ready for {batch_type} printing", invoices.len()),
        invoices,
    )))
}

pub async fn compliance_report(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiQuery(range): ApiQuery<DateRangeQuery>,
) -> Result<Json<ApiResponse<ComplianceReport>>, ApiError> {
    range.validate()?;
    let report = state
        .invoices
        .compliance_report(range.start_date, range.end_date)
        .await?;
    Ok(Json(api_success("Compliance report generated", report)))
}

pub async fn invoice_audit(
    State(state): State<AppState>,
    _auth: AuthContext,
    ApiPath(invoice_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, ApiError> {
    let trail = state.invoices.audit_trail(invoice_id).await?;
    Ok(Json(api_success(
        format!("{} audit entries", trail.len()),
        trail,
    )))
}
