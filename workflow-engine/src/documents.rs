// Supporting documents attached to claims, and the verification the
// compliance step relies on
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use claims_service::{ClaimsError, ClaimsRepository};
use database_layer::UnknownVariant;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

const MAX_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_NOTES_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LabResults,
    DischargeSummary,
    Prescription,
    ReferralLetter,
    MedicalReport,
    ImagingReport,
    ConsentForm,
    InsuranceCard,
    Identification,
    Other,
}

database_layer::text_enum!(DocumentType {
    LabResults => "lab_results",
    DischargeSummary => "discharge_summary",
    Prescription => "prescription",
    ReferralLetter => "referral_letter",
    MedicalReport => "medical_report",
    ImagingReport => "imaging_report",
    ConsentForm => "consent_form",
    InsuranceCard => "insurance_card",
    Identification => "identification",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

database_layer::text_enum!(VerificationStatus {
    Pending => "pending",
    Verified => "verified",
    Rejected => "rejected",
});

/// One row of `sha_document_attachments`
///
/// Only the metadata is kept here; file storage belongs to the upload service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttachment {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub document_type: DocumentType,
    pub document_name: String,
    pub description: Option<String>,
    pub is_required: bool,
    pub verification_status: VerificationStatus,
    pub verification_notes: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Attach request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub document_type: DocumentType,
    pub document_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_required: bool,
}

impl NewDocument {
    pub fn validate(&self) -> WorkflowResult<()> {
        let name = self.document_name.trim();
        if name.is_empty() {
            return Err(ClaimsError::Validation("Document name is required".into()).into());
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ClaimsError::Validation(format!(
                "Document name exceeds {MAX_NAME_LEN} characters"
            ))
            .into());
        }
        if self
            .description
            .as_ref()
            .is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN)
        {
            return Err(ClaimsError::Validation(format!(
                "Document description exceeds {MAX_DESCRIPTION_LEN} characters"
            ))
            .into());
        }
        Ok(())
    }
}

/// Reviewer decision on one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVerification {
    pub status: VerificationStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DocumentVerification {
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.status == VerificationStatus::Pending {
            return Err(ClaimsError::Validation(
                "Verification status must be verified or rejected".into(),
            )
            .into());
        }
        if self.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(ClaimsError::Validation(format!(
                "Verification notes exceed {MAX_NOTES_LEN} characters"
            ))
            .into());
        }
        Ok(())
    }
}

/// Required and verified attachment counts for one claim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub required: i64,
    pub verified: i64,
}

impl DocumentSummary {
    /// At least one required document, and every required one verified
    pub fn is_complete(&self) -> bool {
        self.required > 0 && self.verified >= self.required
    }

    pub fn of(documents: &[DocumentAttachment]) -> Self {
        let required: Vec<_> = documents.iter().filter(|d| d.is_required).collect();
        let verified = required
            .iter()
            .filter(|d| d.verification_status == VerificationStatus::Verified)
            .count();
        Self {
            required: i64::try_from(required.len()).unwrap_or(i64::MAX),
            verified: i64::try_from(verified).unwrap_or(i64::MAX),
        }
    }
}

/// A claim's attachments with their compliance summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDocuments {
    pub claim_id: Uuid,
    pub documents: Vec<DocumentAttachment>,
    pub summary: DocumentSummary,
    pub compliance_ready: bool,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: &DocumentAttachment) -> WorkflowResult<()>;

    /// Newest first
    async fn documents_for_claim(&self, claim_id: Uuid) -> WorkflowResult<Vec<DocumentAttachment>>;

    async fn find_document(&self, id: Uuid) -> WorkflowResult<Option<DocumentAttachment>>;

    /// Persist the verification fields of `document`
    async fn update_verification(&self, document: &DocumentAttachment) -> WorkflowResult<()>;

    async fn delete_document(&self, id: Uuid) -> WorkflowResult<bool>;

    async fn summarize(&self, claim_id: Uuid) -> WorkflowResult<DocumentSummary>;
}

// ============================================================================
// POSTGRES
// ============================================================================

const DOCUMENT_COLUMNS: &str = "id, claim_id, document_type, document_name, document_description, \
     is_required, verification_status, verification_notes, uploaded_by, uploaded_at, \
     verified_by, verified_at";

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    claim_id: Uuid,
    document_type: String,
    document_name: String,
    document_description: Option<String>,
    is_required: bool,
    verification_status: String,
    verification_notes: Option<String>,
    uploaded_by: Uuid,
    uploaded_at: DateTime<Utc>,
    verified_by: Option<Uuid>,
    verified_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocumentRow> for DocumentAttachment {
    type Error = UnknownVariant;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(DocumentAttachment {
            id: row.id,
            claim_id: row.claim_id,
            document_type: row.document_type.parse()?,
            document_name: row.document_name,
            description: row.document_description,
            is_required: row.is_required,
            verification_status: row.verification_status.parse()?,
            verification_notes: row.verification_notes,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
            verified_by: row.verified_by,
            verified_at: row.verified_at,
        })
    }
}

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert_document(&self, document: &DocumentAttachment) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sha_document_attachments (
                id, claim_id, document_type, document_name, document_description,
                is_required, verification_status, uploaded_by, uploaded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(document.id)
        .bind(document.claim_id)
        .bind(document.document_type.as_str())
        .bind(&document.document_name)
        .bind(&document.description)
        .bind(document.is_required)
        .bind(document.verification_status.as_str())
        .bind(document.uploaded_by)
        .bind(document.uploaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn documents_for_claim(&self, claim_id: Uuid) -> WorkflowResult<Vec<DocumentAttachment>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM sha_document_attachments \
             WHERE claim_id = $1 ORDER BY uploaded_at DESC"
        ))
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(DocumentAttachment::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn find_document(&self, id: Uuid) -> WorkflowResult<Option<DocumentAttachment>> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM sha_document_attachments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DocumentAttachment::try_from).transpose()?)
    }

    async fn update_verification(&self, document: &DocumentAttachment) -> WorkflowResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sha_document_attachments
            SET verification_status = $2, verification_notes = $3,
                verified_by = $4, verified_at = $5
            WHERE id = $1
            "#,
        )
        .bind(document.id)
        .bind(document.verification_status.as_str())
        .bind(&document.verification_notes)
        .bind(document.verified_by)
        .bind(document.verified_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(WorkflowError::not_found("Document", document.id));
        }
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> WorkflowResult<bool> {
        let result = sqlx::query("DELETE FROM sha_document_attachments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn summarize(&self, claim_id: Uuid) -> WorkflowResult<DocumentSummary> {
        let (required, verified): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE is_required),
                COUNT(*) FILTER (WHERE is_required AND verification_status = 'verified')
            FROM sha_document_attachments
            WHERE claim_id = $1
            "#,
        )
        .bind(claim_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(DocumentSummary { required, verified })
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<Vec<DocumentAttachment>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_document(&self, document: &DocumentAttachment) -> WorkflowResult<()> {
        self.documents.write().push(document.clone());
        Ok(())
    }

    async fn documents_for_claim(&self, claim_id: Uuid) -> WorkflowResult<Vec<DocumentAttachment>> {
        let mut documents: Vec<_> = self
            .documents
            .read()
            .iter()
            .filter(|d| d.claim_id == claim_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    async fn find_document(&self, id: Uuid) -> WorkflowResult<Option<DocumentAttachment>> {
        Ok(self.documents.read().iter().find(|d| d.id == id).cloned())
    }

    async fn update_verification(&self, document: &DocumentAttachment) -> WorkflowResult<()> {
        let mut documents = self.documents.write();
        let stored = documents
            .iter_mut()
            .find(|d| d.id == document.id)
            .ok_or_else(|| WorkflowError::not_found("Document", document.id))?;
        stored.verification_status = document.verification_status;
        stored.verification_notes = document.verification_notes.clone();
        stored.verified_by = document.verified_by;
        stored.verified_at = document.verified_at;
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> WorkflowResult<bool> {
        let mut documents = self.documents.write();
        let before = documents.len();
        documents.retain(|d| d.id != id);
        Ok(documents.len() < before)
    }

    async fn summarize(&self, claim_id: Uuid) -> WorkflowResult<DocumentSummary> {
        let documents = self.documents_for_claim(claim_id).await?;
        Ok(DocumentSummary::of(&documents))
    }
}

// ============================================================================
// REGISTER
// ============================================================================

/// Attach, list, verify and remove a claim's supporting documents
#[derive(Clone)]
pub struct DocumentRegister {
    store: Arc<dyn DocumentStore>,
    claims: Arc<dyn ClaimsRepository>,
}

impl DocumentRegister {
    pub fn new(store: Arc<dyn DocumentStore>, claims: Arc<dyn ClaimsRepository>) -> Self {
        Self { store, claims }
    }

    async fn ensure_claim(&self, claim_id: Uuid) -> WorkflowResult<()> {
        self.claims
            .find_claim(claim_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ClaimsError::not_found("Claim", claim_id).into())
    }

    pub async fn attach(
        &self,
        claim_id: Uuid,
        request: NewDocument,
        uploaded_by: Uuid,
    ) -> WorkflowResult<DocumentAttachment> {
        request.validate()?;
        self.ensure_claim(claim_id).await?;

        let document = DocumentAttachment {
            id: Uuid::new_v4(),
            claim_id,
            document_type: request.document_type,
            document_name: request.document_name.trim().to_string(),
            description: request.description,
            is_required: request.is_required,
            verification_status: VerificationStatus::Pending,
            verification_notes: None,
            uploaded_by,
            uploaded_at: Utc::now(),
            verified_by: None,
            verified_at: None,
        };
        self.store.insert_document(&document).await?;
        tracing::info!(
            claim_id = %claim_id,
            document_id = %document.id,
            document_type = %document.document_type,
            required = document.is_required,
            "Document attached"
        );
        Ok(document)
    }

    pub async fn list(&self, claim_id: Uuid) -> WorkflowResult<ClaimDocuments> {
        self.ensure_claim(claim_id).await?;
        let documents = self.store.documents_for_claim(claim_id).await?;
        let summary = DocumentSummary::of(&documents);
        Ok(ClaimDocuments {
            claim_id,
            compliance_ready: summary.is_complete(),
            documents,
            summary,
        })
    }

    pub async fn verify(
        &self,
        document_id: Uuid,
        decision: DocumentVerification,
        verified_by: Uuid,
    ) -> WorkflowResult<DocumentAttachment> {
        decision.validate()?;
        let mut document = self
            .store
            .find_document(document_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Document", document_id))?;

        document.verification_status = decision.status;
        document.verification_notes = decision.notes;
        document.verified_by = Some(verified_by);
        document.verified_at = Some(Utc::now());
        self.store.update_verification(&document).await?;
        tracing::info!(
            claim_id = %document.claim_id,
            document_id = %document.id,
            status = %document.verification_status,
            "Document reviewed"
        );
        Ok(document)
    }

    pub async fn remove(&self, document_id: Uuid) -> WorkflowResult<()> {
        if !self.store.delete_document(document_id).await? {
            return Err(WorkflowError::not_found("Document", document_id));
        }
        tracing::info!(document_id = %document_id, "Document removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims_service::MemoryClaimsRepository;

    fn request(document_type: DocumentType, is_required: bool) -> NewDocument {
        NewDocument {
            document_type,
            document_name: "scan.pdf".into(),
            description: None,
            is_required,
        }
    }

    #[test]
    fn test_summary_completeness() {
        assert!(!DocumentSummary::default().is_complete());
        assert!(!DocumentSummary { required: 2, verified: 1 }.is_complete());
        assert!(DocumentSummary { required: 2, verified: 2 }.is_complete());
    }

    #[test]
    fn test_pending_is_not_a_decision() {
        let decision = DocumentVerification {
            status: VerificationStatus::Pending,
            notes: None,
        };
        assert!(matches!(
            decision.validate(),
            Err(WorkflowError::Claims(ClaimsError::Validation(_)))
        ));
        assert!(request(DocumentType::Other, false).validate().is_ok());
        let blank = NewDocument {
            document_name: "  ".into(),
            ..request(DocumentType::Other, false)
        };
        assert!(blank.validate().is_err());
    }

    #[tokio::test]
    async fn test_attach_requires_an_existing_claim() {
        let register = DocumentRegister::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryClaimsRepository::new()),
        );
        let err = register
            .attach(Uuid::new_v4(), request(DocumentType::LabResults, true), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Claims(ClaimsError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_only_verified_required_documents_count() {
        let store = MemoryDocumentStore::new();
        let claim_id = Uuid::new_v4();
        let now = Utc::now();
        for (required, status) in [
            (true, VerificationStatus::Verified),
            (true, VerificationStatus::Rejected),
            (false, VerificationStatus::Verified),
        ] {
            store
                .insert_document(&DocumentAttachment {
                    id: Uuid::new_v4(),
                    claim_id,
                    document_type: DocumentType::MedicalReport,
                    document_name: "report.pdf".into(),
                    description: None,
                    is_required: required,
                    verification_status: status,
                    verification_notes: None,
                    uploaded_by: Uuid::new_v4(),
                    uploaded_at: now,
                    verified_by: None,
                    verified_at: None,
                })
                .await
                .unwrap();
        }
        let summary = store.summarize(claim_id).await.unwrap();
        assert_eq!(summary, DocumentSummary { required: 2, verified: 1 });
        assert!(!summary.is_complete());
        assert_eq!(
            store.summarize(Uuid::new_v4()).await.unwrap(),
            DocumentSummary::default()
        );
    }
}
