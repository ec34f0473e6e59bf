// Input validation for encounter data
use rust_decimal::Decimal;

use crate::error::{ClaimsError, ClaimsResult};
use crate::models::{Diagnosis, NewClaim, NewClaimItem};

/// ICD-10 shape: one uppercase letter, two or three digits, optional `.` and one to four digits
pub fn is_valid_diagnosis_code(code: &str) -> bool {
    let mut chars = code.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_uppercase()) {
        return false;
    }

    let rest = chars.as_str();
    let (category, subcategory) = match rest.split_once('.') {
        Some((category, subcategory)) => (category, Some(subcategory)),
        None => (rest, None),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !(2..=3).contains(&category.len()) || !all_digits(category) {
        return false;
    }
    match subcategory {
        Some(sub) => (1..=4).contains(&sub.len()) && all_digits(sub),
        None => true,
    }
}

/// Insurer membership numbers are exactly nine digits
pub fn is_valid_member_number(member_number: &str) -> bool {
    member_number.len() == 9 && member_number.chars().all(|c| c.is_ascii_digit())
}

/// Insurer service code for a service type when the encounter did not supply one
pub fn default_service_code(service_type: &str) -> &'static str {
    match service_type.trim().to_lowercase().as_str() {
        "consultation" => "CON001",
        "laboratory" => "LAB001",
        "pharmacy" | "medication" => "MED001",
        "radiology" => "RAD001",
        "procedure" => "PRO001",
        _ => "OTH001",
    }
}

pub fn line_total(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

fn validate_diagnosis(diagnosis: &Diagnosis, label: &str) -> ClaimsResult<()> {
    if diagnosis.code.trim().is_empty() {
        return Err(ClaimsError::Validation(format!("{label} diagnosis code is required")));
    }
    if !is_valid_diagnosis_code(&diagnosis.code) {
        return Err(ClaimsError::Validation(format!(
            "Invalid {label} diagnosis code '{}': expected ICD-10 format such as A09 or J18.9",
            diagnosis.code
        )));
    }
    Ok(())
}

fn validate_item(index: usize, item: &NewClaimItem) -> ClaimsResult<()> {
    let line = index + 1;
    if item.service_type.trim().is_empty() {
        return Err(ClaimsError::Validation(format!("Item {line}: service type is required")));
    }
    if item.description.trim().is_empty() {
        return Err(ClaimsError::Validation(format!("Item {line}: description is required")));
    }
    if item.quantity < 1 {
        return Err(ClaimsError::Validation(format!(
            "Item {line}: quantity must be at least 1"
        )));
    }
    if item.unit_price.is_sign_negative() {
        return Err(ClaimsError::Validation(format!(
            "Item {line}: unit price cannot be negative"
        )));
    }
    Ok(())
}

/// Reject malformed encounter data before anything is written
pub fn validate_new_claim(new: &NewClaim) -> ClaimsResult<()> {
    if new.op_number.trim().is_empty() {
        return Err(ClaimsError::Validation("OP number is required".into()));
    }
    if new.member_number.trim().is_empty() {
        return Err(ClaimsError::Validation("Member number is required".into()));
    }
    validate_diagnosis(&new.primary_diagnosis, "primary")?;
    for diagnosis in &new.secondary_diagnoses {
        validate_diagnosis(diagnosis, "secondary")?;
    }
    if new.items.is_empty() {
        return Err(ClaimsError::Validation(
            "A claim needs at least one line item".into(),
        ));
    }
    for (index, item) in new.items.iter().enumerate() {
        validate_item(index, item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn encounter() -> NewClaim {
        NewClaim {
            patient_id: Uuid::new_v4(),
            visit_id: Uuid::new_v4(),
            op_number: "OP-1001".into(),
            member_number: "123456789".into(),
            visit_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            primary_diagnosis: Diagnosis {
                code: "J18.9".into(),
                description: "Pneumonia, unspecified".into(),
            },
            secondary_diagnoses: vec![],
            items: vec![NewClaimItem {
                service_type: "consultation".into(),
                service_code: None,
                description: "General consultation".into(),
                quantity: 1,
                unit_price: Decimal::new(5000, 2),
                provided_by: None,
                department: None,
            }],
            notes: None,
            draft: false,
        }
    }

    #[test]
    fn test_diagnosis_codes() {
        for code in ["A09", "J18.9", "E119", "S72.0012", "Z00.0"] {
            assert!(is_valid_diagnosis_code(code), "{code} should be valid");
        }
        for code in ["", "a09", "J1", "J1234", "J18.", "J18.12345", "18.9", "JJ8", "J18-9"] {
            assert!(!is_valid_diagnosis_code(code), "{code} should be invalid");
        }
    }

    #[test]
    fn test_member_number() {
        assert!(is_valid_member_number("123456789"));
        assert!(!is_valid_member_number("12345678"));
        assert!(!is_valid_member_number("12345678X"));
    }

    #[test]
    fn test_default_service_codes() {
        assert_eq!(default_service_code("Consultation"), "CON001");
        assert_eq!(default_service_code("medication"), "MED001");
        assert_eq!(default_service_code("pharmacy"), "MED001");
        assert_eq!(default_service_code("dental"), "OTH001");
    }

    #[test]
    fn test_valid_encounter_passes() {
        assert!(validate_new_claim(&encounter()).is_ok());
    }

    #[test]
    fn test_missing_items_rejected() {
        let mut new = encounter();
        new.items.clear();
        assert!(matches!(validate_new_claim(&new), Err(ClaimsError::Validation(_))));
    }

    #[test]
    fn test_bad_secondary_diagnosis_rejected() {
        let mut new = encounter();
        new.secondary_diagnoses.push(Diagnosis {
            code: "not-a-code".into(),
            description: "?".into(),
        });
        assert!(matches!(validate_new_claim(&new), Err(ClaimsError::Validation(_))));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut new = encounter();
        if let Some(item) = new.items.first_mut() {
            item.quantity = 0;
        }
        assert!(matches!(validate_new_claim(&new), Err(ClaimsError::Validation(_))));
    }
}
