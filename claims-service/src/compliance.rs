// Per-claim compliance checklist and period reports
use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Claim, ComplianceStatus, Invoice, InvoiceStatus};
use crate::validation::{is_valid_diagnosis_code, is_valid_member_number};

/// Result of running the checklist against one claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub claim_id: Uuid,
    pub claim_number: String,
    pub issues: Vec<String>,
}

impl ComplianceCheck {
    pub fn run(claim: &Claim, today: NaiveDate) -> Self {
        let mut issues = Vec::new();

        if claim.claim_number.trim().is_empty() {
            issues.push("Claim number is missing".to_string());
        }
        if !is_valid_member_number(&claim.member_number) {
            issues.push(format!(
                "Member number '{}' must be exactly nine digits",
                claim.member_number
            ));
        }
        if !is_valid_diagnosis_code(&claim.primary_diagnosis.code) {
            issues.push(format!(
                "Diagnosis code '{}' is not a valid ICD-10 code",
                claim.primary_diagnosis.code
            ));
        }
        if claim.visit_date > today {
            issues.push(format!("Visit date {} is in the future", claim.visit_date));
        }
        if claim.claim_amount <= Decimal::ZERO {
            issues.push("Claim amount must be positive".to_string());
        }

        Self {
            claim_id: claim.id,
            claim_number: claim.claim_number.clone(),
            issues,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn status(&self) -> ComplianceStatus {
        if self.is_clean() {
            ComplianceStatus::Verified
        } else {
            ComplianceStatus::Rejected
        }
    }
}

/// Invoice counts and totals for a period, plus the claims that fail the checklist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_invoices: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_compliance_status: BTreeMap<String, usize>,
    pub amount_by_status: BTreeMap<String, Decimal>,
    pub non_compliant_claims: Vec<ComplianceCheck>,
}

impl ComplianceReport {
    pub fn build<'a>(
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        invoices: &[Invoice],
        claims: impl IntoIterator<Item = &'a Claim>,
        today: NaiveDate,
    ) -> Self {
        let mut report = Self {
            start_date,
            end_date,
            total_invoices: invoices.len(),
            ..Self::default()
        };

        for status in InvoiceStatus::ALL {
            report.by_status.insert(status.to_string(), 0);
            report.amount_by_status.insert(status.to_string(), Decimal::ZERO);
        }
        for invoice in invoices {
            *report.by_status.entry(invoice.status.to_string()).or_default() += 1;
            *report
                .by_compliance_status
                .entry(invoice.compliance_status.to_string())
                .or_default() += 1;
            *report
                .amount_by_status
                .entry(invoice.status.to_string())
                .or_default() += invoice.total_amount;
        }

        report.non_compliant_claims = claims
            .into_iter()
            .map(|claim| ComplianceCheck::run(claim, today))
            .filter(|check| !check.is_clean())
            .collect();

        report
    }
}
