// Claims CSV for the insurer portal and batch submission reports
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClaimsError, ClaimsResult};
use crate::models::{Batch, Claim, ClaimFilter, ClaimItem, ClaimStatus, ComplianceStatus};
use crate::repository::ClaimsRepository;

/// Statuses exported when the request names none
pub const EXPORTABLE_STATUSES: &[ClaimStatus] = &[
    ClaimStatus::ReadyToSubmit,
    ClaimStatus::InvoiceReady,
    ClaimStatus::Submitted,
];

/// Portal upload layout, one line per claim service line
pub const PORTAL_HEADERS: [&str; 15] = [
    "CLAIM_NUMBER",
    "MEMBER_NUMBER",
    "OP_NUMBER",
    "VISIT_DATE",
    "DIAGNOSIS_CODE",
    "DIAGNOSIS_DESCRIPTION",
    "SERVICE_TYPE",
    "SERVICE_CODE",
    "SERVICE_DESCRIPTION",
    "QUANTITY",
    "UNIT_PRICE",
    "TOTAL_AMOUNT",
    "PROVIDER_CODE",
    "CLAIM_STATUS",
    "SHA_REFERENCE",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimExportFilter {
    pub status: Option<ClaimStatus>,
    pub visit_from: Option<NaiveDate>,
    pub visit_to: Option<NaiveDate>,
}

#[derive(Serialize)]
struct PortalRow<'a> {
    claim_number: &'a str,
    member_number: &'a str,
    op_number: &'a str,
    visit_date: NaiveDate,
    diagnosis_code: &'a str,
    diagnosis_description: &'a str,
    service_type: &'a str,
    service_code: &'a str,
    service_description: &'a str,
    quantity: i32,
    unit_price: Decimal,
    total_amount: Decimal,
    provider_code: &'a str,
    claim_status: &'static str,
    sha_reference: Option<&'a str>,
}

/// Rendered claims CSV
#[derive(Debug, Clone)]
pub struct ClaimsCsv {
    pub content: String,
    pub claims: usize,
    pub lines: usize,
}

/// Write the portal CSV; the header row is always present
pub fn render_claims_csv(claims: &[(Claim, Vec<ClaimItem>)]) -> ClaimsResult<ClaimsCsv> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(PORTAL_HEADERS)?;

    let mut lines = 0;
    for (claim, items) in claims {
        for item in items {
            writer.serialize(PortalRow {
                claim_number: &claim.claim_number,
                member_number: &claim.member_number,
                op_number: &claim.op_number,
                visit_date: claim.visit_date,
                diagnosis_code: &claim.primary_diagnosis.code,
                diagnosis_description: &claim.primary_diagnosis.description,
                service_type: &item.service_type,
                service_code: &item.service_code,
                service_description: &item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_amount: item.total_price,
                provider_code: &claim.provider_code,
                claim_status: claim.status.as_str(),
                sha_reference: claim.sha_reference.as_deref(),
            })?;
            lines += 1;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ClaimsError::Export(err.error().to_string()))?;
    let content = String::from_utf8(bytes).map_err(|err| ClaimsError::Export(err.to_string()))?;
    Ok(ClaimsCsv {
        content,
        claims: claims.len(),
        lines,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReportLine {
    pub claim_id: Uuid,
    pub claim_number: String,
    pub op_number: String,
    pub member_number: String,
    pub visit_date: NaiveDate,
    pub claim_amount: Decimal,
    pub status: ClaimStatus,
    pub compliance_status: ComplianceStatus,
    pub sha_reference: Option<String>,
    pub approved_amount: Option<Decimal>,
    pub rejection_reason: Option<String>,
}

impl From<&Claim> for BatchReportLine {
    fn from(claim: &Claim) -> Self {
        Self {
            claim_id: claim.id,
            claim_number: claim.claim_number.clone(),
            op_number: claim.op_number.clone(),
            member_number: claim.member_number.clone(),
            visit_date: claim.visit_date,
            claim_amount: claim.claim_amount,
            status: claim.status,
            compliance_status: claim.compliance_status,
            sha_reference: claim.sha_reference.clone(),
            approved_amount: claim.approved_amount,
            rejection_reason: claim.rejection_reason.clone(),
        }
    }
}

/// Batch summary with per-claim outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch: Batch,
    pub claims: Vec<BatchReportLine>,
    pub total_claims: usize,
    pub total_amount: Decimal,
    pub approved_amount: Decimal,
    pub by_status: BTreeMap<String, usize>,
    pub by_compliance_status: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

impl BatchReport {
    /// Totals come from the member claims as they are now
    pub fn build(batch: Batch, claims: &[Claim], generated_at: DateTime<Utc>) -> Self {
        let mut by_status = BTreeMap::new();
        let mut by_compliance_status = BTreeMap::new();
        for claim in claims {
            *by_status.entry(claim.status.to_string()).or_default() += 1;
            *by_compliance_status
                .entry(claim.compliance_status.to_string())
                .or_default() += 1;
        }

        let mut lines: Vec<BatchReportLine> = claims.iter().map(BatchReportLine::from).collect();
        lines.sort_by(|a, b| a.claim_number.cmp(&b.claim_number));

        Self {
            batch,
            total_claims: claims.len(),
            total_amount: claims.iter().map(|c| c.claim_amount).sum(),
            approved_amount: claims.iter().filter_map(|c| c.approved_amount).sum(),
            claims: lines,
            by_status,
            by_compliance_status,
            generated_at,
        }
    }
}

/// Read-only exports over the claims repository
#[derive(Clone)]
pub struct ExportService {
    repo: Arc<dyn ClaimsRepository>,
}

impl ExportService {
    pub fn new(repo: Arc<dyn ClaimsRepository>) -> Self {
        Self { repo }
    }

    pub async fn batch_report(&self, batch_id: Uuid) -> ClaimsResult<BatchReport> {
        let batch = self
            .repo
            .find_batch(batch_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Batch", batch_id))?;
        let claims = self.repo.batch_claims(batch_id).await?;
        tracing::info!(
            batch_id = %batch_id,
            batch_number = %batch.batch_number,
            claims = claims.len(),
            "Batch report generated"
        );
        Ok(BatchReport::build(batch, &claims, Utc::now()))
    }

    /// Newest visits first
    pub async fn claims_csv(&self, filter: &ClaimExportFilter) -> ClaimsResult<ClaimsCsv> {
        if let (Some(from), Some(to)) = (filter.visit_from, filter.visit_to) {
            if from > to {
                return Err(ClaimsError::Validation(format!(
                    "Export range start {from} is after end {to}"
                )));
            }
        }

        let listing = ClaimFilter {
            status: filter.status,
            visit_from: filter.visit_from,
            visit_to: filter.visit_to,
            ..ClaimFilter::default()
        };
        let mut claims: Vec<Claim> = self
            .repo
            .list_claims(&listing)
            .await?
            .into_iter()
            .filter(|c| filter.status.is_some() || EXPORTABLE_STATUSES.contains(&c.status))
            .collect();
        claims.sort_by(|a, b| {
            b.visit_date
                .cmp(&a.visit_date)
                .then_with(|| a.claim_number.cmp(&b.claim_number))
        });

        let mut rows = Vec::with_capacity(claims.len());
        for claim in claims {
            let items = self.repo.claim_items(claim.id).await?;
            rows.push((claim, items));
        }
        let csv = render_claims_csv(&rows)?;
        tracing::info!(
            claims = csv.claims,
            lines = csv.lines,
            status = ?filter.status,
            "Claims CSV exported"
        );
        Ok(csv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchStatus, BatchType, Diagnosis};

    fn claim(number: &str, amount: i64, status: ClaimStatus) -> Claim {
        let now = Utc::now();
        Claim {
            id: Uuid::new_v4(),
            claim_number: number.into(),
            patient_id: Uuid::new_v4(),
            visit_id: Uuid::new_v4(),
            op_number: "OP-1".into(),
            member_number: "123456789".into(),
            visit_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            primary_diagnosis: Diagnosis {
                code: "J06.9".into(),
                description: "Acute upper respiratory infection, unspecified".into(),
            },
            secondary_diagnoses: vec![],
            provider_code: "CLINIC001".into(),
            claim_amount: Decimal::new(amount, 0),
            status,
            compliance_status: ComplianceStatus::Pending,
            batch_id: None,
            sha_reference: None,
            submission_date: None,
            approved_amount: None,
            approval_date: None,
            rejection_reason: None,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn item(claim_id: Uuid, description: &str, quantity: i32, unit: i64) -> ClaimItem {
        ClaimItem {
            id: Uuid::new_v4(),
            claim_id,
            service_type: "consultation".into(),
            service_code: "CONS-01".into(),
            description: description.into(),
            quantity,
            unit_price: Decimal::new(unit * 100, 2),
            total_price: Decimal::new(unit * 100 * i64::from(quantity), 2),
            provided_by: None,
            department: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_csv_has_one_line_per_service_and_quotes_commas() {
        let first = claim("CLM-202406-000001", 1900, ClaimStatus::InvoiceReady);
        let items = vec![
            item(first.id, "General consultation", 1, 1000),
            item(first.id, "Dressing, small", 2, 450),
        ];
        let csv = render_claims_csv(&[(first, items)]).unwrap();
        assert_eq!(csv.claims, 1);
        assert_eq!(csv.lines, 2);

        let lines: Vec<&str> = csv.content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], PORTAL_HEADERS.join(","));
        assert!(lines[2].contains("\"Dressing, small\""));
        assert!(lines[2].contains(",2,450.00,900.00,CLINIC001,invoice_ready,"));
        assert!(lines[1].starts_with("CLM-202406-000001,123456789,OP-1,2024-06-03,J06.9,"));
    }

    #[test]
    fn test_empty_export_keeps_header() {
        let csv = render_claims_csv(&[]).unwrap();
        assert_eq!(csv.content.trim_end(), PORTAL_HEADERS.join(","));
        assert_eq!(csv.lines, 0);
    }

    #[test]
    fn test_batch_report_totals_follow_member_outcomes() {
        let now = Utc::now();
        let batch = Batch {
            id: Uuid::new_v4(),
            batch_number: "BATCH-202406-000001".into(),
            batch_date: now.date_naive(),
            batch_type: BatchType::Weekly,
            total_claims: 2,
            total_amount: Decimal::new(700, 0),
            status: BatchStatus::Submitted,
            sha_batch_reference: Some("SHA-B-1".into()),
            submitted_by: None,
            submitted_at: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        let mut approved = claim("CLM-202406-000002", 400, ClaimStatus::Approved);
        approved.approved_amount = Some(Decimal::new(350, 0));
        let rejected = claim("CLM-202406-000001", 300, ClaimStatus::Rejected);

        let report = BatchReport::build(batch, &[approved, rejected], now);
        assert_eq!(report.total_claims, 2);
        assert_eq!(report.total_amount, Decimal::new(700, 0));
        assert_eq!(report.approved_amount, Decimal::new(350, 0));
        assert_eq!(report.by_status.get("approved"), Some(&1));
        assert_eq!(report.by_status.get("rejected"), Some(&1));
        assert_eq!(report.claims[0].claim_number, "CLM-202406-000001");
    }
}
