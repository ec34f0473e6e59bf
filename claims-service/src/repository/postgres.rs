// Postgres repository
use async_trait::async_trait;
use audit_engine::{AuditDetails, AuditEntry};
use chrono::{DateTime, NaiveDate, Utc};
use database_layer::{DatabaseError, UnknownVariant};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    BatchSelection, BatchSubmissionOutcome, ClaimSubmissionOutcome, ClaimsRepository,
    RemoteStatusUpdate, StatusChange, SubmissionFailure,
};
use crate::error::{ClaimsError, ClaimsResult};
use crate::models::{
    Batch, BatchStatus, Claim, ClaimFilter, ClaimItem, ClaimStatus, ComplianceStatus, Diagnosis,
    Invoice, InvoiceFilter, InvoiceUpdate, SubmissionLog, SubmissionStatus, SubmissionTarget,
    SubmissionType,
};
use crate::numbering::NumberScope;

const CLAIM_COLUMNS: &str = "id, claim_number, patient_id, visit_id, op_number, member_number, \
     visit_date, primary_diagnosis_code, primary_diagnosis_description, secondary_diagnoses, \
     provider_code, claim_amount, status, compliance_status, batch_id, sha_reference, \
     submission_date, approved_amount, approval_date, rejection_reason, notes, created_by, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, claim_id, service_type, service_code, description, quantity, \
     unit_price, total_price, provided_by, department, created_at";

const INVOICE_COLUMNS: &str = "id, invoice_number, claim_id, revision, patient_id, invoice_date, \
     due_date, total_amount, status, compliance_status, notes, generated_by, generated_at, \
     printed_by, printed_at, submitted_by, submitted_at, sha_reference, updated_at";

const BATCH_COLUMNS: &str = "id, batch_number, batch_date, batch_type, total_claims, \
     total_amount, status, sha_batch_reference, submitted_by, submitted_at, created_by, \
     created_at, updated_at";

const LOG_COLUMNS: &str = "id, claim_id, batch_id, invoice_id, submission_type, \
     request_payload, response_payload, status, retry_count, error_message, submitted_by, \
     created_at, completed_at";

const AUDIT_COLUMNS: &str = "id, claim_id, invoice_id, action, performed_by, performed_at, \
     details, compliance_check";

const OPEN_INVOICE_INDEX: &str = "uq_sha_invoices_open_claim";
const INVOICE_REVISION_KEY: &str = "uq_sha_invoices_claim_revision";
const PENDING_CLAIM_INDEX: &str = "uq_sha_submission_logs_pending_claim";
const PENDING_BATCH_INDEX: &str = "uq_sha_submission_logs_pending_batch";

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, FromRow)]
struct ClaimRow {
    id: Uuid,
    claim_number: String,
    patient_id: Uuid,
    visit_id: Uuid,
    op_number: String,
    member_number: String,
    visit_date: NaiveDate,
    primary_diagnosis_code: String,
    primary_diagnosis_description: String,
    secondary_diagnoses: Json<Vec<Diagnosis>>,
    provider_code: String,
    claim_amount: Decimal,
    status: String,
    compliance_status: String,
    batch_id: Option<Uuid>,
    sha_reference: Option<String>,
    submission_date: Option<DateTime<Utc>>,
    approved_amount: Option<Decimal>,
    approval_date: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ClaimRow> for Claim {
    type Error = UnknownVariant;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        Ok(Claim {
            id: row.id,
            claim_number: row.claim_number,
            patient_id: row.patient_id,
            visit_id: row.visit_id,
            op_number: row.op_number,
            member_number: row.member_number,
            visit_date: row.visit_date,
            primary_diagnosis: Diagnosis {
                code: row.primary_diagnosis_code,
                description: row.primary_diagnosis_description,
            },
            secondary_diagnoses: row.secondary_diagnoses.0,
            provider_code: row.provider_code,
            claim_amount: row.claim_amount,
            status: row.status.parse()?,
            compliance_status: row.compliance_status.parse()?,
            batch_id: row.batch_id,
            sha_reference: row.sha_reference,
            submission_date: row.submission_date,
            approved_amount: row.approved_amount,
            approval_date: row.approval_date,
            rejection_reason: row.rejection_reason,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    claim_id: Uuid,
    revision: i32,
    patient_id: Uuid,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    total_amount: Decimal,
    status: String,
    compliance_status: String,
    notes: Option<String>,
    generated_by: Uuid,
    generated_at: DateTime<Utc>,
    printed_by: Option<Uuid>,
    printed_at: Option<DateTime<Utc>>,
    submitted_by: Option<Uuid>,
    submitted_at: Option<DateTime<Utc>>,
    sha_reference: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = UnknownVariant;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row.id,
            invoice_number: row.invoice_number,
            claim_id: row.claim_id,
            revision: row.revision,
            patient_id: row.patient_id,
            invoice_date: row.invoice_date,
            due_date: row.due_date,
            total_amount: row.total_amount,
            status: row.status.parse()?,
            compliance_status: row.compliance_status.parse()?,
            notes: row.notes,
            generated_by: row.generated_by,
            generated_at: row.generated_at,
            printed_by: row.printed_by,
            printed_at: row.printed_at,
            submitted_by: row.submitted_by,
            submitted_at: row.submitted_at,
            sha_reference: row.sha_reference,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    batch_number: String,
    batch_date: NaiveDate,
    batch_type: String,
    total_claims: i32,
    total_amount: Decimal,
    status: String,
    sha_batch_reference: Option<String>,
    submitted_by: Option<Uuid>,
    submitted_at: Option<DateTime<Utc>>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = UnknownVariant;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        Ok(Batch {
            id: row.id,
            batch_number: row.batch_number,
            batch_date: row.batch_date,
            batch_type: row.batch_type.parse()?,
            total_claims: row.total_claims,
            total_amount: row.total_amount,
            status: row.status.parse()?,
            sha_batch_reference: row.sha_batch_reference,
            submitted_by: row.submitted_by,
            submitted_at: row.submitted_at,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SubmissionLogRow {
    id: Uuid,
    claim_id: Option<Uuid>,
    batch_id: Option<Uuid>,
    invoice_id: Option<Uuid>,
    submission_type: String,
    request_payload: serde_json::Value,
    response_payload: Option<serde_json::Value>,
    status: String,
    retry_count: i32,
    error_message: Option<String>,
    submitted_by: Uuid,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubmissionLogRow> for SubmissionLog {
    type Error = UnknownVariant;

    fn try_from(row: SubmissionLogRow) -> Result<Self, Self::Error> {
        Ok(SubmissionLog {
            id: row.id,
            claim_id: row.claim_id,
            batch_id: row.batch_id,
            invoice_id: row.invoice_id,
            submission_type: row.submission_type.parse()?,
            request_payload: row.request_payload,
            response_payload: row.response_payload,
            status: row.status.parse()?,
            retry_count: row.retry_count,
            error_message: row.error_message,
            submitted_by: row.submitted_by,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    claim_id: Uuid,
    invoice_id: Option<Uuid>,
    action: String,
    performed_by: Uuid,
    performed_at: DateTime<Utc>,
    details: serde_json::Value,
    compliance_check: bool,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = audit_engine::AuditError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        AuditEntry::from_stored(
            row.id,
            row.claim_id,
            row.invoice_id,
            &row.action,
            row.performed_by,
            row.performed_at,
            row.details,
            row.compliance_check,
        )
    }
}

fn convert_all<R, T, E>(rows: Vec<R>) -> ClaimsResult<Vec<T>>
where
    T: TryFrom<R, Error = E>,
    ClaimsError: From<E>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(ClaimsError::from))
        .collect()
}

// ============================================================================
// SHARED STATEMENTS
// ============================================================================

async fn insert_audit(conn: &mut PgConnection, entry: &AuditEntry) -> ClaimsResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sha_audit_trail (
            id, claim_id, invoice_id, action, performed_by, performed_at, details, compliance_check
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.id)
    .bind(entry.claim_id)
    .bind(entry.invoice_id)
    .bind(entry.action.as_str())
    .bind(entry.performed_by)
    .bind(entry.performed_at)
    .bind(entry.details_json()?)
    .bind(entry.compliance_check)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn claim_status(conn: &mut PgConnection, claim_id: Uuid) -> ClaimsResult<Option<ClaimStatus>> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM claims WHERE id = $1")
        .bind(claim_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(status.map(|s| s.parse::<ClaimStatus>()).transpose()?)
}

/// Why a guarded invoice update touched no row
async fn explain_invoice(conn: &mut PgConnection, invoice_id: Uuid) -> ClaimsError {
    let found: Result<Option<(String, String)>, sqlx::Error> =
        sqlx::query_as("SELECT invoice_number, status FROM sha_invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_optional(&mut *conn)
            .await;
    match found {
        Ok(Some((invoice_number, _))) => ClaimsError::InvoiceLocked { invoice_number },
        Ok(None) => ClaimsError::not_found("Invoice", invoice_id),
        Err(e) => e.into(),
    }
}

/// Why a guarded claim transition touched no row
async fn explain_claim(conn: &mut PgConnection, claim_id: Uuid, to: impl ToString) -> ClaimsError {
    match claim_status(conn, claim_id).await {
        Ok(Some(current)) => ClaimsError::invalid_transition(current, to),
        Ok(None) => ClaimsError::not_found("Claim", claim_id),
        Err(e) => e,
    }
}

async fn finish_log(
    conn: &mut PgConnection,
    log_id: Uuid,
    status: SubmissionStatus,
    response: Option<&serde_json::Value>,
    error_message: Option<&str>,
    completed_at: DateTime<Utc>,
) -> ClaimsResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sha_submission_logs
        SET status = $2, response_payload = $3, error_message = $4, completed_at = $5
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(log_id)
    .bind(status.as_str())
    .bind(response)
    .bind(error_message)
    .bind(completed_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM sha_submission_logs WHERE id = $1")
                .bind(log_id)
                .fetch_optional(&mut *conn)
                .await?;
        return Err(match current {
            Some(current) => ClaimsError::invalid_transition(current, status),
            None => ClaimsError::not_found("Submission log", log_id),
        });
    }
    Ok(())
}

async fn lock_claim_and_invoice(
    conn: &mut PgConnection,
    claim_id: Uuid,
    invoice_id: Uuid,
    sha_reference: &str,
    submitted_by: Uuid,
    submitted_at: DateTime<Utc>,
) -> ClaimsResult<()> {
    // sha_reference is write-once: a resubmitted claim keeps its first reference
    let claimed = sqlx::query(
        r#"
        UPDATE claims
        SET status = 'submitted',
            sha_reference = COALESCE(sha_reference, $2),
            submission_date = $3,
            updated_at = $3
        WHERE id = $1 AND status = 'invoice_ready'
        "#,
    )
    .bind(claim_id)
    .bind(sha_reference)
    .bind(submitted_at)
    .execute(&mut *conn)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(explain_claim(conn, claim_id, ClaimStatus::Submitted).await);
    }

    let locked = sqlx::query(
        r#"
        UPDATE sha_invoices
        SET status = 'submitted', submitted_by = $2, submitted_at = $3, sha_reference = $4,
            updated_at = $3
        WHERE id = $1 AND status <> 'submitted'
        "#,
    )
    .bind(invoice_id)
    .bind(submitted_by)
    .bind(submitted_at)
    .bind(sha_reference)
    .execute(&mut *conn)
    .await?;
    if locked.rows_affected() == 0 {
        return Err(explain_invoice(conn, invoice_id).await);
    }
    Ok(())
}

fn push_claim_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ClaimFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(batch_id) = filter.batch_id {
        qb.push(" AND batch_id = ").push_bind(batch_id);
    }
    if filter.unbatched_only {
        qb.push(" AND batch_id IS NULL");
    }
    if let Some(op_number) = &filter.op_number {
        qb.push(" AND op_number = ").push_bind(op_number.clone());
    }
    if let Some(member_number) = &filter.member_number {
        qb.push(" AND member_number = ").push_bind(member_number.clone());
    }
    if let Some(from) = filter.visit_from {
        qb.push(" AND visit_date >= ").push_bind(from);
    }
    if let Some(to) = filter.visit_to {
        qb.push(" AND visit_date <= ").push_bind(to);
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(before) = filter.created_before {
        qb.push(" AND created_at < ").push_bind(before);
    }
    if let Some(term) = &filter.search {
        let pattern = format!("%{term}%");
        qb.push(" AND (claim_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR op_number ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, limit: Option<i64>, offset: Option<i64>) {
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = offset {
        qb.push(" OFFSET ").push_bind(offset);
    }
}

fn classify_invoice_insert(err: sqlx::Error, claim_id: Uuid) -> ClaimsError {
    let err = DatabaseError::from(err);
    if err.is_unique_violation(OPEN_INVOICE_INDEX) || err.is_unique_violation(INVOICE_REVISION_KEY)
    {
        return ClaimsError::DuplicateInvoice { claim_id };
    }
    ClaimsError::Persistence(err)
}

fn classify_log_insert(err: sqlx::Error, log: &SubmissionLog) -> ClaimsError {
    let err = DatabaseError::from(err);
    if err.is_unique_violation(PENDING_CLAIM_INDEX) {
        let target = log.claim_id.map_or_else(
            || log.id.to_string(),
            |id| SubmissionTarget::Claim(id).to_string(),
        );
        return ClaimsError::SubmissionInProgress { target };
    }
    if err.is_unique_violation(PENDING_BATCH_INDEX) {
        let target = log.batch_id.map_or_else(
            || log.id.to_string(),
            |id| SubmissionTarget::Batch(id).to_string(),
        );
        return ClaimsError::SubmissionInProgress { target };
    }
    ClaimsError::Persistence(err)
}

fn trace_all(entries: &[AuditEntry]) {
    for entry in entries {
        entry.trace();
    }
}

// ============================================================================
// REPOSITORY
// ============================================================================

/// [`ClaimsRepository`] backed by the `claims` / `sha_*` tables
#[derive(Clone, Debug)]
pub struct PgClaimsRepository {
    pool: PgPool,
}

impl PgClaimsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClaimsRepository for PgClaimsRepository {
    async fn next_sequence(&self, scope: NumberScope, period: &str) -> ClaimsResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sha_number_sequences (scope, period, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (scope, period)
            DO UPDATE SET last_value = sha_number_sequences.last_value + 1, updated_at = NOW()
            RETURNING last_value
            "#,
        )
        .bind(scope.as_str())
        .bind(period)
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }

    async fn insert_claim(
        &self,
        claim: &Claim,
        items: &[ClaimItem],
        audit: &AuditEntry,
    ) -> ClaimsResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO claims (
                id, claim_number, patient_id, visit_id, op_number, member_number, visit_date,
                primary_diagnosis_code, primary_diagnosis_description, secondary_diagnoses,
                provider_code, claim_amount, status, compliance_status, notes, created_by,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(claim.id)
        .bind(&claim.claim_number)
        .bind(claim.patient_id)
        .bind(claim.visit_id)
        .bind(&claim.op_number)
        .bind(&claim.member_number)
        .bind(claim.visit_date)
        .bind(&claim.primary_diagnosis.code)
        .bind(&claim.primary_diagnosis.description)
        .bind(Json(&claim.secondary_diagnoses))
        .bind(&claim.provider_code)
        .bind(claim.claim_amount)
        .bind(claim.status.as_str())
        .bind(claim.compliance_status.as_str())
        .bind(&claim.notes)
        .bind(claim.created_by)
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO claim_items (
                    id, claim_id, service_type, service_code, description, quantity,
                    unit_price, total_price, provided_by, department, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.id)
            .bind(item.claim_id)
            .bind(&item.service_type)
            .bind(&item.service_code)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(&item.provided_by)
            .bind(&item.department)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;
        audit.trace();
        Ok(())
    }

    async fn find_claim(&self, claim_id: Uuid) -> ClaimsResult<Option<Claim>> {
        let row = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE id = $1"
        ))
        .bind(claim_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Claim::try_from).transpose()?)
    }

    async fn claim_items(&self, claim_id: Uuid) -> ClaimsResult<Vec<ClaimItem>> {
        let items = sqlx::query_as::<_, ClaimItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM claim_items WHERE claim_id = $1 ORDER BY created_at, id"
        ))
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn list_claims(&self, filter: &ClaimFilter) -> ClaimsResult<Vec<Claim>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE 1=1"
        ));
        push_claim_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, claim_number DESC");
        push_page(&mut qb, filter.limit, filter.offset);

        let rows = qb.build_query_as::<ClaimRow>().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn count_claims(&self, filter: &ClaimFilter) -> ClaimsResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM claims WHERE 1=1");
        push_claim_filter(&mut qb, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn update_claim_status(&self, change: &StatusChange) -> ClaimsResult<Claim> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ClaimRow>(&format!(
            r#"
            UPDATE claims
            SET status = $3,
                batch_id = CASE WHEN $4 THEN NULL ELSE batch_id END,
                updated_at = $5
            WHERE id = $1 AND status = $2
            RETURNING {CLAIM_COLUMNS}
            "#
        ))
        .bind(change.claim_id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.clear_batch)
        .bind(change.at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(explain_claim(&mut tx, change.claim_id, change.to).await);
        };

        insert_audit(&mut tx, &change.audit).await?;
        tx.commit().await?;
        change.audit.trace();
        Ok(Claim::try_from(row)?)
    }

    async fn set_compliance_status(
        &self,
        claim_id: Uuid,
        status: ComplianceStatus,
        audit: &AuditEntry,
    ) -> ClaimsResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE claims SET compliance_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(claim_id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(ClaimsError::not_found("Claim", claim_id));
        }

        sqlx::query(
            r#"
            UPDATE sha_invoices SET compliance_status = $2, updated_at = NOW()
            WHERE claim_id = $1 AND status <> 'submitted'
            "#,
        )
        .bind(claim_id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;
        audit.trace();
        Ok(())
    }

    async fn delete_claim(&self, claim_id: Uuid, audit: &AuditEntry) -> ClaimsResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM claims
            WHERE id = $1
              AND status IN ('draft', 'ready_to_submit')
              AND batch_id IS NULL
              AND NOT EXISTS (SELECT 1 FROM sha_invoices WHERE claim_id = $1)
            "#,
        )
        .bind(claim_id)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() == 0 {
            return Err(explain_claim(&mut tx, claim_id, "deleted").await);
        }

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;
        audit.trace();
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &Invoice, audit: &AuditEntry) -> ClaimsResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sha_invoices (
                id, invoice_number, claim_id, revision, patient_id, invoice_date, due_date,
                total_amount, status, compliance_status, notes, generated_by, generated_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.claim_id)
        .bind(invoice.revision)
        .bind(invoice.patient_id)
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.total_amount)
        .bind(invoice.status.as_str())
        .bind(invoice.compliance_status.as_str())
        .bind(&invoice.notes)
        .bind(invoice.generated_by)
        .bind(invoice.generated_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_invoice_insert(e, invoice.claim_id))?;

        let advanced = sqlx::query(
            r#"
            UPDATE claims SET status = 'invoice_ready', updated_at = $2
            WHERE id = $1 AND status = 'ready_to_submit'
            "#,
        )
        .bind(invoice.claim_id)
        .bind(invoice.generated_at)
        .execute(&mut *tx)
        .await?;
        if advanced.rows_affected() == 0 {
            return Err(explain_claim(&mut tx, invoice.claim_id, ClaimStatus::InvoiceReady).await);
        }

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;
        audit.trace();
        Ok(())
    }

    async fn find_invoice(&self, invoice_id: Uuid) -> ClaimsResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM sha_invoices WHERE id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Invoice::try_from).transpose()?)
    }

    async fn invoices_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM sha_invoices WHERE claim_id = $1 ORDER BY revision"
        ))
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> ClaimsResult<Vec<Invoice>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {INVOICE_COLUMNS} FROM sha_invoices WHERE 1=1"
        ));
        if !filter.statuses.is_empty() {
            let statuses: Vec<String> = filter.statuses.iter().map(ToString::to_string).collect();
            qb.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        if let Some(claim_id) = filter.claim_id {
            qb.push(" AND claim_id = ").push_bind(claim_id);
        }
        if let Some(from) = filter.invoice_from {
            qb.push(" AND invoice_date >= ").push_bind(from);
        }
        if let Some(to) = filter.invoice_to {
            qb.push(" AND invoice_date <= ").push_bind(to);
        }
        if let Some(from) = filter.submitted_from {
            qb.push(" AND submitted_at >= ").push_bind(from);
        }
        if let Some(before) = filter.submitted_before {
            qb.push(" AND submitted_at < ").push_bind(before);
        }
        if let Some(term) = &filter.search {
            qb.push(" AND invoice_number ILIKE ")
                .push_bind(format!("%{term}%"));
        }
        qb.push(" ORDER BY generated_at DESC, invoice_number DESC");
        push_page(&mut qb, filter.limit, filter.offset);

        let rows = qb.build_query_as::<InvoiceRow>().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn mark_invoice_printed(
        &self,
        invoice_id: Uuid,
        printed_by: Uuid,
        printed_at: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> ClaimsResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            UPDATE sha_invoices
            SET status = 'printed', printed_by = $2, printed_at = $3, updated_at = $3
            WHERE id = $1 AND status <> 'submitted'
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice_id)
        .bind(printed_by)
        .bind(printed_at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(explain_invoice(&mut tx, invoice_id).await);
        };

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;
        audit.trace();
        Ok(Invoice::try_from(row)?)
    }

    async fn update_invoice(
        &self,
        invoice_id: Uuid,
        update: &InvoiceUpdate,
        audit: &AuditEntry,
    ) -> ClaimsResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            UPDATE sha_invoices
            SET due_date = COALESCE($2, due_date), notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1 AND status <> 'submitted'
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice_id)
        .bind(update.due_date)
        .bind(&update.notes)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(explain_invoice(&mut tx, invoice_id).await);
        };

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;
        audit.trace();
        Ok(Invoice::try_from(row)?)
    }

    async fn create_batch(&self, batch: &Batch, selection: &BatchSelection) -> ClaimsResult<Batch> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sha_claim_batches (
                id, batch_number, batch_date, batch_type, total_claims, total_amount, status,
                created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, 0, 0, $5, $6, $7, $7)
            "#,
        )
        .bind(batch.id)
        .bind(&batch.batch_number)
        .bind(batch.batch_date)
        .bind(batch.batch_type.as_str())
        .bind(batch.status.as_str())
        .bind(batch.created_by)
        .bind(batch.created_at)
        .execute(&mut *tx)
        .await?;

        // Conditional assignment: a claim already taken by a concurrent batch is skipped
        let members: Vec<(Uuid, Decimal)> = match selection {
            BatchSelection::Claims(ids) => {
                sqlx::query_as(
                    r#"
                    UPDATE claims SET batch_id = $1, updated_at = NOW()
                    WHERE id = ANY($2) AND status = 'ready_to_submit' AND batch_id IS NULL
                    RETURNING id, claim_amount
                    "#,
                )
                .bind(batch.id)
                .bind(ids)
                .fetch_all(&mut *tx)
                .await?
            }
            BatchSelection::Window { start, end } => {
                sqlx::query_as(
                    r#"
                    UPDATE claims SET batch_id = $1, updated_at = NOW()
                    WHERE status = 'ready_to_submit' AND batch_id IS NULL
                      AND created_at >= $2 AND created_at < $3
                    RETURNING id, claim_amount
                    "#,
                )
                .bind(batch.id)
                .bind(start)
                .bind(end)
                .fetch_all(&mut *tx)
                .await?
            }
        };

        if members.is_empty() {
            return Err(ClaimsError::NoEligibleClaims);
        }

        let total_claims = i32::try_from(members.len())
            .map_err(|_| ClaimsError::Validation("Too many claims for one batch".into()))?;
        let total_amount: Decimal = members.iter().map(|(_, amount)| *amount).sum();

        let row = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            UPDATE sha_claim_batches SET total_claims = $2, total_amount = $3
            WHERE id = $1
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(batch.id)
        .bind(total_claims)
        .bind(total_amount)
        .fetch_one(&mut *tx)
        .await?;

        let audits: Vec<AuditEntry> = members
            .iter()
            .map(|(claim_id, _)| {
                AuditEntry::new(
                    *claim_id,
                    batch.created_by,
                    AuditDetails::Batched {
                        batch_id: batch.id,
                        batch_number: batch.batch_number.clone(),
                    },
                )
            })
            .collect();
        for entry in &audits {
            insert_audit(&mut tx, entry).await?;
        }

        tx.commit().await?;
        trace_all(&audits);
        Ok(Batch::try_from(row)?)
    }

    async fn find_batch(&self, batch_id: Uuid) -> ClaimsResult<Option<Batch>> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM sha_claim_batches WHERE id = $1"
        ))
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Batch::try_from).transpose()?)
    }

    async fn list_batches(&self, status: Option<BatchStatus>) -> ClaimsResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM sha_claim_batches
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn batch_claims(&self, batch_id: Uuid) -> ClaimsResult<Vec<Claim>> {
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE batch_id = $1 ORDER BY claim_number"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn delete_batch(&self, batch_id: Uuid, deleted_by: Uuid) -> ClaimsResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, String)> = sqlx::query_as(
            "SELECT batch_number, status FROM sha_claim_batches WHERE id = $1 FOR UPDATE",
        )
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((batch_number, status)) = current else {
            return Err(ClaimsError::not_found("Batch", batch_id));
        };
        let status: BatchStatus = status.parse()?;
        if status != BatchStatus::Draft {
            return Err(ClaimsError::BatchNotDraft {
                batch_number,
                status,
            });
        }

        let mut released: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE claims SET batch_id = NULL, updated_at = NOW() WHERE batch_id = $1 RETURNING id",
        )
        .bind(batch_id)
        .fetch_all(&mut *tx)
        .await?;
        released.sort();

        sqlx::query("DELETE FROM sha_claim_batches WHERE id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        let audits: Vec<AuditEntry> = released
            .iter()
            .map(|claim_id| {
                AuditEntry::new(
                    *claim_id,
                    deleted_by,
                    AuditDetails::Unbatched {
                        batch_id,
                        batch_number: batch_number.clone(),
                    },
                )
            })
            .collect();
        for entry in &audits {
            insert_audit(&mut tx, entry).await?;
        }

        tx.commit().await?;
        trace_all(&audits);
        Ok(released)
    }

    async fn complete_batch(&self, batch_id: Uuid) -> ClaimsResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sha_claim_batches SET status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status = 'submitted'
              AND NOT EXISTS (
                  SELECT 1 FROM claims
                  WHERE batch_id = $1 AND status NOT IN ('approved', 'rejected', 'paid')
              )
            "#,
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.find_batch(batch_id).await? {
            Some(_) => Ok(false),
            None => Err(ClaimsError::not_found("Batch", batch_id)),
        }
    }

    async fn begin_submission(&self, log: &SubmissionLog) -> ClaimsResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sha_submission_logs (
                id, claim_id, batch_id, invoice_id, submission_type, request_payload, status,
                retry_count, submitted_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(log.id)
        .bind(log.claim_id)
        .bind(log.batch_id)
        .bind(log.invoice_id)
        .bind(log.submission_type.as_str())
        .bind(&log.request_payload)
        .bind(log.status.as_str())
        .bind(log.retry_count)
        .bind(log.submitted_by)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify_log_insert(e, log))?;
        Ok(())
    }

    async fn previous_attempts(&self, target: SubmissionTarget) -> ClaimsResult<i32> {
        let (column, id, kind) = match target {
            SubmissionTarget::Claim(id) => ("claim_id", id, SubmissionType::Single),
            SubmissionTarget::Batch(id) => ("batch_id", id, SubmissionType::Batch),
        };
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM sha_submission_logs WHERE {column} = $1 AND submission_type = $2"
        ))
        .bind(id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(i32::try_from(count).unwrap_or(i32::MAX))
    }

    async fn fail_submission(&self, failure: &SubmissionFailure) -> ClaimsResult<()> {
        let mut tx = self.pool.begin().await?;

        finish_log(
            &mut tx,
            failure.log_id,
            SubmissionStatus::Failed,
            failure.response_payload.as_ref(),
            Some(&failure.error_message),
            failure.completed_at,
        )
        .await?;
        for entry in &failure.audits {
            insert_audit(&mut tx, entry).await?;
        }

        tx.commit().await?;
        trace_all(&failure.audits);
        Ok(())
    }

    async fn complete_claim_submission(
        &self,
        outcome: &ClaimSubmissionOutcome,
    ) -> ClaimsResult<()> {
        let mut tx = self.pool.begin().await?;

        finish_log(
            &mut tx,
            outcome.log_id,
            SubmissionStatus::Success,
            Some(&outcome.response_payload),
            None,
            outcome.submitted_at,
        )
        .await?;
        lock_claim_and_invoice(
            &mut tx,
            outcome.claim_id,
            outcome.invoice_id,
            &outcome.sha_reference,
            outcome.submitted_by,
            outcome.submitted_at,
        )
        .await?;
        insert_audit(&mut tx, &outcome.audit).await?;

        tx.commit().await?;
        outcome.audit.trace();
        Ok(())
    }

    async fn complete_batch_submission(
        &self,
        outcome: &BatchSubmissionOutcome,
    ) -> ClaimsResult<()> {
        let mut tx = self.pool.begin().await?;

        finish_log(
            &mut tx,
            outcome.log_id,
            SubmissionStatus::Success,
            Some(&outcome.response_payload),
            None,
            outcome.submitted_at,
        )
        .await?;

        let submitted = sqlx::query(
            r#"
            UPDATE sha_claim_batches
            SET status = 'submitted', sha_batch_reference = $2, submitted_by = $3,
                submitted_at = $4, updated_at = $4
            WHERE id = $1 AND status = 'draft'
            "#,
        )
        .bind(outcome.batch_id)
        .bind(&outcome.sha_batch_reference)
        .bind(outcome.submitted_by)
        .bind(outcome.submitted_at)
        .execute(&mut *tx)
        .await?;
        if submitted.rows_affected() == 0 {
            let current: Option<(String, String)> =
                sqlx::query_as("SELECT batch_number, status FROM sha_claim_batches WHERE id = $1")
                    .bind(outcome.batch_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some((batch_number, status)) => ClaimsError::BatchNotDraft {
                    batch_number,
                    status: status.parse()?,
                },
                None => ClaimsError::not_found("Batch", outcome.batch_id),
            });
        }

        for member in &outcome.claims {
            lock_claim_and_invoice(
                &mut tx,
                member.claim_id,
                member.invoice_id,
                &member.sha_reference,
                outcome.submitted_by,
                outcome.submitted_at,
            )
            .await?;
            insert_audit(&mut tx, &member.audit).await?;
        }

        tx.commit().await?;
        for member in &outcome.claims {
            member.audit.trace();
        }
        Ok(())
    }

    async fn find_submission_log(&self, log_id: Uuid) -> ClaimsResult<Option<SubmissionLog>> {
        let row = sqlx::query_as::<_, SubmissionLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM sha_submission_logs WHERE id = $1"
        ))
        .bind(log_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SubmissionLog::try_from).transpose()?)
    }

    async fn submission_logs_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<SubmissionLog>> {
        let rows = sqlx::query_as::<_, SubmissionLogRow>(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM sha_submission_logs
            WHERE claim_id = $1
               OR batch_id = (SELECT batch_id FROM claims WHERE id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn stale_pending_submissions(
        &self,
        created_before: DateTime<Utc>,
    ) -> ClaimsResult<Vec<SubmissionLog>> {
        let rows = sqlx::query_as::<_, SubmissionLogRow>(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM sha_submission_logs
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            "#
        ))
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn claims_awaiting_outcome(&self) -> ClaimsResult<Vec<Claim>> {
        let rows = sqlx::query_as::<_, ClaimRow>(&format!(
            r#"
            SELECT {CLAIM_COLUMNS} FROM claims
            WHERE status IN ('submitted', 'approved') AND sha_reference IS NOT NULL
            ORDER BY submission_date
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn apply_remote_status(&self, update: &RemoteStatusUpdate) -> ClaimsResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE claims
            SET status = $3,
                approved_amount = COALESCE($4, approved_amount),
                approval_date = COALESCE($5, approval_date),
                rejection_reason = COALESCE($6, rejection_reason),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(update.claim_id)
        .bind(update.from.as_str())
        .bind(update.to.as_str())
        .bind(update.approved_amount)
        .bind(update.approval_date)
        .bind(&update.rejection_reason)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        insert_audit(&mut tx, &update.audit).await?;
        tx.commit().await?;
        update.audit.trace();
        Ok(true)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> ClaimsResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_audit(&mut conn, entry).await?;
        entry.trace();
        Ok(())
    }

    async fn audit_for_claim(&self, claim_id: Uuid) -> ClaimsResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM sha_audit_trail WHERE claim_id = $1 ORDER BY performed_at, id"
        ))
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn audit_for_invoice(&self, invoice_id: Uuid) -> ClaimsResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM sha_audit_trail WHERE invoice_id = $1 ORDER BY performed_at, id"
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}
