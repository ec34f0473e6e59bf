// Standardized error codes returned in the `error` field of API error bodies

pub mod validation {
    pub const INVALID_INPUT: &str = "VALIDATION_1001";
    pub const MISSING_REQUIRED_FIELD: &str = "VALIDATION_1002";
    pub const INVALID_FORMAT: &str = "VALIDATION_1003";
}

pub mod authentication {
    pub const INVALID_CREDENTIALS: &str = "AUTH_2001";
    pub const TOKEN_EXPIRED: &str = "AUTH_2002";
}

pub mod authorization {
    pub const ACCESS_DENIED: &str = "AUTHZ_3001";
}

pub mod database {
    pub const CONNECTION_FAILED: &str = "DB_4001";
    pub const QUERY_FAILED: &str = "DB_4002";
    pub const CONSTRAINT_VIOLATION: &str = "DB_4003";
}

pub mod claims {
    pub const NOT_FOUND: &str = "CLAIM_5001";
    pub const INVALID_TRANSITION: &str = "CLAIM_5002";
    pub const NO_ELIGIBLE_CLAIMS: &str = "CLAIM_5003";
    pub const BATCH_NOT_DRAFT: &str = "CLAIM_5004";
}

pub mod invoices {
    pub const DUPLICATE_INVOICE: &str = "INVOICE_6001";
    pub const INVOICE_NOT_READY: &str = "INVOICE_6002";
    pub const INVOICE_LOCKED: &str = "INVOICE_6003";
}

pub mod submission {
    pub const GATEWAY_FAILURE: &str = "SUBMISSION_7001";
    pub const IN_PROGRESS: &str = "SUBMISSION_7002";
}

pub mod workflow {
    pub const PREREQUISITES_NOT_MET: &str = "WORKFLOW_8001";
    pub const INVALID_STEP_TRANSITION: &str = "WORKFLOW_8002";
    pub const WORKFLOW_CLOSED: &str = "WORKFLOW_8003";
    pub const ALREADY_INITIALIZED: &str = "WORKFLOW_8004";
    pub const STEP_FAILED: &str = "WORKFLOW_8005";
}

pub mod system {
    pub const INTERNAL: &str = "SYSTEM_9001";
}
