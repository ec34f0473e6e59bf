// Canonical SHA claim processing template

/// Label stored in `sha_workflow_instances.workflow_type`
pub const WORKFLOW_TYPE: &str = "SHA_CLAIM_PROCESSING";

pub const CLAIM_CREATION: &str = "claim_creation";
pub const CLINICAL_REVIEW: &str = "clinical_review";
pub const DOCUMENT_COLLECTION: &str = "document_collection";
pub const COMPLIANCE_VERIFICATION: &str = "compliance_verification";
pub const INVOICE_GENERATION: &str = "invoice_generation";
pub const INVOICE_REVIEW: &str = "invoice_review";
pub const INVOICE_PRINTING: &str = "invoice_printing";
pub const CLAIM_SUBMISSION: &str = "claim_submission";
pub const PAYMENT_TRACKING: &str = "payment_tracking";

/// Static definition of one template step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTemplate {
    pub name: &'static str,
    pub required: bool,
    pub automated: bool,
    pub estimated_minutes: i32,
    pub prerequisites: &'static [&'static str],
}

/// The nine steps in order. Each step waits on the one before it.
pub const SHA_CLAIM_TEMPLATE: [StepTemplate; 9] = [
    StepTemplate {
        name: CLAIM_CREATION,
        required: true,
        automated: false,
        estimated_minutes: 15,
        prerequisites: &[],
    },
    StepTemplate {
        name: CLINICAL_REVIEW,
        required: true,
        automated: false,
        estimated_minutes: 30,
        prerequisites: &[CLAIM_CREATION],
    },
    StepTemplate {
        name: DOCUMENT_COLLECTION,
        required: true,
        automated: false,
        estimated_minutes: 20,
        prerequisites: &[CLINICAL_REVIEW],
    },
    StepTemplate {
        name: COMPLIANCE_VERIFICATION,
        required: true,
        automated: true,
        estimated_minutes: 5,
        prerequisites: &[DOCUMENT_COLLECTION],
    },
    StepTemplate {
        name: INVOICE_GENERATION,
        required: true,
        automated: true,
        estimated_minutes: 2,
        prerequisites: &[COMPLIANCE_VERIFICATION],
    },
    StepTemplate {
        name: INVOICE_REVIEW,
        required: true,
        automated: false,
        estimated_minutes: 15,
        prerequisites: &[INVOICE_GENERATION],
    },
    StepTemplate {
        name: INVOICE_PRINTING,
        required: true,
        automated: false,
        estimated_minutes: 5,
        prerequisites: &[INVOICE_REVIEW],
    },
    StepTemplate {
        name: CLAIM_SUBMISSION,
        required: true,
        automated: false,
        estimated_minutes: 10,
        prerequisites: &[INVOICE_PRINTING],
    },
    StepTemplate {
        name: PAYMENT_TRACKING,
        required: false,
        automated: true,
        estimated_minutes: 1,
        prerequisites: &[CLAIM_SUBMISSION],
    },
];

/// Steps that list `name` as a prerequisite
pub fn successors(name: &str) -> Vec<String> {
    SHA_CLAIM_TEMPLATE
        .iter()
        .filter(|step| step.prerequisites.contains(&name))
        .map(|step| step.name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_is_a_chain() {
        for pair in SHA_CLAIM_TEMPLATE.windows(2) {
            if let [before, after] = pair {
                assert_eq!(after.prerequisites, &[before.name]);
                assert_eq!(successors(before.name), vec![after.name.to_string()]);
            }
        }
        assert!(successors(PAYMENT_TRACKING).is_empty());
    }

    #[test]
    fn test_only_payment_tracking_is_optional() {
        let optional: Vec<_> = SHA_CLAIM_TEMPLATE
            .iter()
            .filter(|s| !s.required)
            .map(|s| s.name)
            .collect();
        assert_eq!(optional, vec![PAYMENT_TRACKING]);

        let estimates: Vec<_> = SHA_CLAIM_TEMPLATE.iter().map(|s| s.estimated_minutes).collect();
        assert_eq!(estimates, vec![15, 30, 20, 5, 2, 15, 5, 10, 1]);
    }
}
