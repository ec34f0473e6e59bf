// Postgres repository
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database_layer::{DatabaseError, UnknownVariant};
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{WorkflowChange, WorkflowRepository};
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    ActivityEntry, PaymentTracking, WorkflowFilter, WorkflowInstance, WorkflowStatistics,
    WorkflowStep,
};
use crate::workflow::Workflow;

const INSTANCE_COLUMNS: &str = "id, claim_id, invoice_id, workflow_type, current_step, \
     overall_status, initiated_by, started_at, completed_at, created_at, updated_at";

const STEP_COLUMNS: &str = "id, workflow_id, step_name, step_order, status, required, \
     automated, estimated_minutes, actual_minutes, assigned_to, completed_by, prerequisites, \
     next_steps, notes, started_at, completed_at";

const ACTIVITY_COLUMNS: &str =
    "id, workflow_id, step_name, action, performed_by, details, created_at";

const PAYMENT_COLUMNS: &str =
    "id, claim_id, workflow_id, auto_check_enabled, next_check_at, created_at";

const CLAIM_WORKFLOW_KEY: &str = "uq_sha_workflow_instances_claim";

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, FromRow)]
struct InstanceRow {
    id: Uuid,
    claim_id: Uuid,
    invoice_id: Option<Uuid>,
    workflow_type: String,
    current_step: Option<String>,
    overall_status: String,
    initiated_by: Uuid,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InstanceRow> for WorkflowInstance {
    type Error = UnknownVariant;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(WorkflowInstance {
            id: row.id,
            claim_id: row.claim_id,
            invoice_id: row.invoice_id,
            workflow_type: row.workflow_type,
            current_step: row.current_step,
            overall_status: row.overall_status.parse()?,
            initiated_by: row.initiated_by,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StepRow {
    id: Uuid,
    workflow_id: Uuid,
    step_name: String,
    step_order: i32,
    status: String,
    required: bool,
    automated: bool,
    estimated_minutes: i32,
    actual_minutes: Option<i32>,
    assigned_to: Option<Uuid>,
    completed_by: Option<Uuid>,
    prerequisites: Vec<String>,
    next_steps: Vec<String>,
    notes: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<StepRow> for WorkflowStep {
    type Error = UnknownVariant;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(WorkflowStep {
            id: row.id,
            workflow_id: row.workflow_id,
            step_name: row.step_name,
            step_order: row.step_order,
            status: row.status.parse()?,
            required: row.required,
            automated: row.automated,
            estimated_minutes: row.estimated_minutes,
            actual_minutes: row.actual_minutes,
            assigned_to: row.assigned_to,
            completed_by: row.completed_by,
            prerequisites: row.prerequisites,
            next_steps: row.next_steps,
            notes: row.notes,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: Uuid,
    workflow_id: Uuid,
    step_name: Option<String>,
    action: String,
    performed_by: Uuid,
    details: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityEntry {
    type Error = UnknownVariant;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(ActivityEntry {
            id: row.id,
            workflow_id: row.workflow_id,
            step_name: row.step_name,
            action: row.action.parse()?,
            performed_by: row.performed_by,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    claim_id: Uuid,
    workflow_id: Uuid,
    auto_check_enabled: bool,
    next_check_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for PaymentTracking {
    fn from(row: PaymentRow) -> Self {
        PaymentTracking {
            id: row.id,
            claim_id: row.claim_id,
            workflow_id: row.workflow_id,
            auto_check_enabled: row.auto_check_enabled,
            next_check_at: row.next_check_at,
            created_at: row.created_at,
        }
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> WorkflowResult<Vec<T>>
where
    T: TryFrom<R, Error = UnknownVariant>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(WorkflowError::from))
        .collect()
}

// ============================================================================
// HELPERS
// ============================================================================

async fn insert_step(conn: &mut PgConnection, step: &WorkflowStep) -> WorkflowResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sha_workflow_steps (
            id, workflow_id, step_name, step_order, status, required, automated,
            estimated_minutes, actual_minutes, assigned_to, completed_by, prerequisites,
            next_steps, notes, started_at, completed_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(step.id)
    .bind(step.workflow_id)
    .bind(&step.step_name)
    .bind(step.step_order)
    .bind(step.status.as_str())
    .bind(step.required)
    .bind(step.automated)
    .bind(step.estimated_minutes)
    .bind(step.actual_minutes)
    .bind(step.assigned_to)
    .bind(step.completed_by)
    .bind(&step.prerequisites)
    .bind(&step.next_steps)
    .bind(&step.notes)
    .bind(step.started_at)
    .bind(step.completed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_step(conn: &mut PgConnection, step: &WorkflowStep) -> WorkflowResult<()> {
    sqlx::query(
        r#"
        UPDATE sha_workflow_steps SET
            status = $2, actual_minutes = $3, assigned_to = $4, completed_by = $5,
            notes = $6, started_at = $7, completed_at = $8
        WHERE id = $1
        "#,
    )
    .bind(step.id)
    .bind(step.status.as_str())
    .bind(step.actual_minutes)
    .bind(step.assigned_to)
    .bind(step.completed_by)
    .bind(&step.notes)
    .bind(step.started_at)
    .bind(step.completed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_activity(conn: &mut PgConnection, entries: &[ActivityEntry]) -> WorkflowResult<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO sha_workflow_activity_log (
                id, workflow_id, step_name, action, performed_by, details, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.workflow_id)
        .bind(&entry.step_name)
        .bind(entry.action.as_str())
        .bind(entry.performed_by)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn classify_workflow_insert(err: sqlx::Error, claim_id: Uuid) -> WorkflowError {
    let err = DatabaseError::from(err);
    if err.is_unique_violation(CLAIM_WORKFLOW_KEY) {
        return WorkflowError::AlreadyInitialized { claim_id };
    }
    WorkflowError::Persistence(err)
}

// ============================================================================
// REPOSITORY
// ============================================================================

pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn steps_for(&self, workflow_ids: &[Uuid]) -> WorkflowResult<HashMap<Uuid, Vec<WorkflowStep>>> {
        let rows = sqlx::query_as::<_, StepRow>(&format!(
            "SELECT {STEP_COLUMNS} FROM sha_workflow_steps \
             WHERE workflow_id = ANY($1) ORDER BY workflow_id, step_order"
        ))
        .bind(workflow_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<WorkflowStep>> = HashMap::new();
        for step in convert_all::<_, WorkflowStep>(rows)? {
            grouped.entry(step.workflow_id).or_default().push(step);
        }
        Ok(grouped)
    }

    async fn assemble(&self, rows: Vec<InstanceRow>) -> WorkflowResult<Vec<Workflow>> {
        let instances: Vec<WorkflowInstance> = convert_all(rows)?;
        let ids: Vec<Uuid> = instances.iter().map(|i| i.id).collect();
        let mut steps = self.steps_for(&ids).await?;
        Ok(instances
            .into_iter()
            .map(|instance| Workflow {
                steps: steps.remove(&instance.id).unwrap_or_default(),
                instance,
            })
            .collect())
    }

    async fn find_one(&self, column: &str, value: Uuid) -> WorkflowResult<Option<Workflow>> {
        let rows = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM sha_workflow_instances WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;
        Ok(self.assemble(rows).await?.into_iter().next())
    }
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn insert_workflow(
        &self,
        workflow: &Workflow,
        activity: &[ActivityEntry],
    ) -> WorkflowResult<()> {
        let instance = &workflow.instance;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sha_workflow_instances (
                id, claim_id, invoice_id, workflow_type, current_step, overall_status,
                initiated_by, started_at, completed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(instance.id)
        .bind(instance.claim_id)
        .bind(instance.invoice_id)
        .bind(&instance.workflow_type)
        .bind(&instance.current_step)
        .bind(instance.overall_status.as_str())
        .bind(instance.initiated_by)
        .bind(instance.started_at)
        .bind(instance.completed_at)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_workflow_insert(e, instance.claim_id))?;

        for step in &workflow.steps {
            insert_step(&mut tx, step).await?;
        }
        insert_activity(&mut tx, activity).await?;
        tx.commit().await?;

        activity.iter().for_each(ActivityEntry::trace);
        Ok(())
    }

    async fn find_workflow(&self, workflow_id: Uuid) -> WorkflowResult<Option<Workflow>> {
        self.find_one("id", workflow_id).await
    }

    async fn find_by_claim(&self, claim_id: Uuid) -> WorkflowResult<Option<Workflow>> {
        self.find_one("claim_id", claim_id).await
    }

    async fn list_workflows(&self, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {INSTANCE_COLUMNS} FROM sha_workflow_instances WHERE 1=1"
        ));
        if let Some(status) = filter.status {
            qb.push(" AND overall_status = ").push_bind(status.as_str());
        }
        if let Some(claim_id) = filter.claim_id {
            qb.push(" AND claim_id = ").push_bind(claim_id);
        }
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset);
        }

        let rows = qb
            .build_query_as::<InstanceRow>()
            .fetch_all(&self.pool)
            .await?;
        self.assemble(rows).await
    }

    async fn save_workflow(&self, change: &WorkflowChange) -> WorkflowResult<()> {
        let instance = &change.instance;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE sha_workflow_instances SET
                invoice_id = $3, current_step = $4, overall_status = $5,
                started_at = $6, completed_at = $7, updated_at = $8
            WHERE id = $1 AND updated_at = $2
            "#,
        )
        .bind(instance.id)
        .bind(change.expected_updated_at)
        .bind(instance.invoice_id)
        .bind(&instance.current_step)
        .bind(instance.overall_status.as_str())
        .bind(instance.started_at)
        .bind(instance.completed_at)
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM sha_workflow_instances WHERE id = $1")
                    .bind(instance.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => WorkflowError::Conflict(instance.id),
                None => WorkflowError::not_found("Workflow", instance.id),
            });
        }

        for step in &change.steps {
            update_step(&mut tx, step).await?;
        }
        insert_activity(&mut tx, &change.activity).await?;
        tx.commit().await?;

        change.activity.iter().for_each(ActivityEntry::trace);
        Ok(())
    }

    async fn activity(&self, workflow_id: Uuid) -> WorkflowResult<Vec<ActivityEntry>> {
        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM sha_workflow_activity_log \
             WHERE workflow_id = $1 ORDER BY created_at, id"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn statistics(&self) -> WorkflowResult<WorkflowStatistics> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT overall_status, COUNT(*) FROM sha_workflow_instances GROUP BY overall_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let average_completion_minutes: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT (AVG(EXTRACT(EPOCH FROM (completed_at - started_at))) / 60.0)::FLOAT8
            FROM sha_workflow_instances
            WHERE overall_status = 'completed'
              AND started_at IS NOT NULL AND completed_at IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let step_failures: Vec<(String, i64)> = sqlx::query_as(
            "SELECT step_name, COUNT(*) FROM sha_workflow_steps \
             WHERE status = 'failed' GROUP BY step_name",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_status: BTreeMap<String, i64> = by_status.into_iter().collect();
        Ok(WorkflowStatistics {
            total: by_status.values().sum(),
            by_status,
            average_completion_minutes,
            step_failures: step_failures.into_iter().collect(),
        })
    }

    async fn insert_payment_tracking(&self, record: &PaymentTracking) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sha_payment_tracking (
                id, claim_id, workflow_id, auto_check_enabled, next_check_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.claim_id)
        .bind(record.workflow_id)
        .bind(record.auto_check_enabled)
        .bind(record.next_check_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn payment_tracking_for_claim(
        &self,
        claim_id: Uuid,
    ) -> WorkflowResult<Vec<PaymentTracking>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM sha_payment_tracking \
             WHERE claim_id = $1 ORDER BY created_at"
        ))
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PaymentTracking::from).collect())
    }
}
