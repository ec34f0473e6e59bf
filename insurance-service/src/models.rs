use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use claims_service::{Batch, Claim, ClaimItem, Diagnosis, Invoice};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::InsurerError;

// ============================================================================
// OUTBOUND PAYLOADS
// ============================================================================

/// One itemized service as the insurer expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub service_code: String,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl From<&ClaimItem> for ServiceLine {
    fn from(item: &ClaimItem) -> Self {
        Self {
            service_code: item.service_code.clone(),
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        }
    }
}

/// Normalized single-claim submission body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimPayload {
    pub claim_number: String,
    pub invoice_number: String,
    pub member_number: String,
    pub visit_date: NaiveDate,
    pub diagnosis: Diagnosis,
    pub services: Vec<ServiceLine>,
    pub total_amount: Decimal,
    pub provider_code: String,
}

impl ClaimPayload {
    pub fn build(
        claim: &Claim,
        invoice: &Invoice,
        items: &[ClaimItem],
        provider_code: &str,
    ) -> Self {
        Self {
            claim_number: claim.claim_number.clone(),
            invoice_number: invoice.invoice_number.clone(),
            member_number: claim.member_number.clone(),
            visit_date: claim.visit_date,
            diagnosis: claim.primary_diagnosis.clone(),
            services: items.iter().map(ServiceLine::from).collect(),
            total_amount: claim.claim_amount,
            provider_code: provider_code.to_string(),
        }
    }
}

/// Normalized batch submission body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub batch_number: String,
    pub batch_date: NaiveDate,
    pub provider_code: String,
    pub claims: Vec<ClaimPayload>,
    pub total_claims: usize,
    pub total_amount: Decimal,
}

impl BatchPayload {
    /// Totals are recomputed from the member payloads, not copied from the batch row
    pub fn build(batch: &Batch, claims: Vec<ClaimPayload>, provider_code: &str) -> Self {
        let total_amount = claims.iter().map(|c| c.total_amount).sum();
        Self {
            batch_number: batch.batch_number.clone(),
            batch_date: batch.batch_date,
            provider_code: provider_code.to_string(),
            total_claims: claims.len(),
            total_amount,
            claims,
        }
    }
}

// ============================================================================
// INSURER RESPONSES
// ============================================================================

fn text_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Accepted single-claim submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionAck {
    pub reference: String,
    /// Full response body, stored on the submission log
    pub body: Value,
}

impl SubmissionAck {
    pub fn from_body(body: Value) -> Result<Self, InsurerError> {
        let reference = text_field(&body, &["reference", "claim_reference"]).ok_or_else(|| {
            InsurerError::MalformedResponse("submission accepted without a reference".into())
        })?;
        Ok(Self { reference, body })
    }
}

/// Insurer reference assigned to one member of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReference {
    pub claim_number: String,
    pub reference: String,
}

/// Accepted batch submission
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAck {
    pub reference: String,
    pub claims: Vec<ClaimReference>,
    pub body: Value,
}

impl BatchAck {
    pub fn from_body(body: Value) -> Result<Self, InsurerError> {
        let reference = text_field(&body, &["batch_reference", "reference"]).ok_or_else(|| {
            InsurerError::MalformedResponse("batch accepted without a reference".into())
        })?;
        let claims = body
            .get("claims")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        Some(ClaimReference {
                            claim_number: text_field(entry, &["claim_number"])?,
                            reference: text_field(entry, &["reference", "claim_reference"])?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            reference,
            claims,
            body,
        })
    }

    /// Per-claim reference, falling back to the batch reference
    pub fn reference_for(&self, claim_number: &str) -> &str {
        self.claims
            .iter()
            .find(|c| c.claim_number == claim_number)
            .map_or(self.reference.as_str(), |c| c.reference.as_str())
    }
}

/// Decision state reported by the insurer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteClaimStatus {
    /// Received but not decided
    InReview,
    Approved,
    Rejected,
    Paid,
}

impl RemoteClaimStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "accepted" => RemoteClaimStatus::Approved,
            "rejected" | "declined" => RemoteClaimStatus::Rejected,
            "paid" | "settled" => RemoteClaimStatus::Paid,
            _ => RemoteClaimStatus::InReview,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RemoteClaimStatus::InReview => "in_review",
            RemoteClaimStatus::Approved => "approved",
            RemoteClaimStatus::Rejected => "rejected",
            RemoteClaimStatus::Paid => "paid",
        }
    }
}

/// Answer to `GET /claims/status/:reference`
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatus {
    pub status: RemoteClaimStatus,
    /// Insurer reference, present once the insurer has registered the claim
    pub reference: Option<String>,
    /// Invoice the insurer registered the claim under, when it says
    pub invoice_number: Option<String>,
    pub approved_amount: Option<Decimal>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub body: Value,
}

#[derive(Deserialize)]
struct StatusFields {
    #[serde(default)]
    approved_amount: Option<Decimal>,
    #[serde(default)]
    approval_date: Option<String>,
    #[serde(default)]
    rejection_reason: Option<String>,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        })
}

impl RemoteStatus {
    pub fn from_body(body: Value) -> Result<Self, InsurerError> {
        let raw_status = text_field(&body, &["status", "claim_status"]).ok_or_else(|| {
            InsurerError::MalformedResponse("status response without a status".into())
        })?;
        let fields: StatusFields = serde_json::from_value(body.clone())?;
        Ok(Self {
            status: RemoteClaimStatus::parse(&raw_status),
            reference: text_field(&body, &["reference", "claim_reference"]),
            invoice_number: text_field(&body, &["invoice_number"]),
            approved_amount: fields.approved_amount,
            approval_date: fields.approval_date.as_deref().and_then(parse_timestamp),
            rejection_reason: fields.rejection_reason,
            body,
        })
    }
}

// ============================================================================
// GATEWAY RESULTS
// ============================================================================

/// Outcome of one submission attempt. Insurer failures are reported here,
/// not raised, so callers can show them and retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub submission_log_id: Uuid,
    pub retry_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Member claim of a confirmed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedClaim {
    pub claim_id: Uuid,
    pub claim_number: String,
    pub sha_reference: String,
}

/// Outcome of one batch submission attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmissionResult {
    pub success: bool,
    pub batch_id: Uuid,
    pub submission_log_id: Uuid,
    pub retry_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha_batch_reference: Option<String>,
    pub claims: Vec<SubmittedClaim>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ack_accepts_claim_reference_alias() {
        let ack = SubmissionAck::from_body(json!({"claim_reference": "SHA-77812"})).unwrap();
        assert_eq!(ack.reference, "SHA-77812");

        let err = SubmissionAck::from_body(json!({"message": "ok"})).unwrap_err();
        assert!(matches!(err, InsurerError::MalformedResponse(_)));
    }

    #[test]
    fn test_batch_ack_falls_back_to_batch_reference() {
        let ack = BatchAck::from_body(json!({
            "batch_reference": "BREF-1",
            "claims": [{"claim_number": "CLM-202406-000001", "reference": "REF-A"}]
        }))
        .unwrap();
        assert_eq!(ack.reference_for("CLM-202406-000001"), "REF-A");
        assert_eq!(ack.reference_for("CLM-202406-000002"), "BREF-1");
    }

    #[test]
    fn test_remote_status_parses_decision_fields() {
        let status = RemoteStatus::from_body(json!({
            "status": "APPROVED",
            "reference": "SHA-1",
            "approved_amount": "75.50",
            "approval_date": "2024-06-20"
        }))
        .unwrap();
        assert_eq!(status.status, RemoteClaimStatus::Approved);
        assert_eq!(status.approved_amount, Some(Decimal::new(7550, 2)));
        assert_eq!(
            status.approval_date.map(|d| d.date_naive()),
            NaiveDate::from_ymd_opt(2024, 6, 20)
        );
    }

    #[test]
    fn test_unknown_remote_status_is_in_review() {
        assert_eq!(
            RemoteClaimStatus::parse("processing"),
            RemoteClaimStatus::InReview
        );
        assert_eq!(RemoteClaimStatus::parse(" Paid "), RemoteClaimStatus::Paid);
    }
}
