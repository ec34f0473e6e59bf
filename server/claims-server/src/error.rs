use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use claims_service::ClaimsError;
use database_layer::DatabaseError;
use error_common::codes;
use insurance_service::GatewayError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;
use workflow_engine::WorkflowError;

/// Standard API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    /// Human-readable error message
    pub message: String,
    /// Stable machine-readable code from `error_common::codes`
    pub error: String,
    /// Unique error ID for tracking in the server logs
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standard API success response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

/// Response metadata for paginated listings
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Main API error enum
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { message: String, code: &'static str },

    #[error("{message}")]
    Authentication { message: String },

    #[error("{message}")]
    Authorization { message: String },

    #[error("{message}")]
    NotFound { message: String, code: &'static str },

    #[error("{message}")]
    Conflict { message: String, code: &'static str },

    #[error("Submission gateway error: {message}")]
    Gateway { message: String },

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// Create a simple validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: codes::validation::INVALID_INPUT,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Authorization { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. } => *code,
            ApiError::Authentication { .. } => codes::authentication::INVALID_CREDENTIALS,
            ApiError::Authorization { .. } => codes::authorization::ACCESS_DENIED,
            ApiError::Gateway { .. } => codes::submission::GATEWAY_FAILURE,
            ApiError::Database(DatabaseError::ConnectionFailed(_)) => {
                codes::database::CONNECTION_FAILED
            }
            ApiError::Database(DatabaseError::UniqueViolation { .. }) => {
                codes::database::CONSTRAINT_VIOLATION
            }
            ApiError::Database(_) => codes::database::QUERY_FAILED,
            ApiError::Internal { .. } => codes::system::INTERNAL,
        }
    }

    /// Message shown to the caller; server faults never leak their internals
    fn public_message(&self) -> String {
        match self {
            ApiError::Database(DatabaseError::ConnectionFailed(_)) => {
                "Unable to reach the database. Try again in a few moments.".to_string()
            }
            ApiError::Database(_) => {
                "The operation could not be saved. No changes were applied.".to_string()
            }
            ApiError::Internal { .. } => "An unexpected error occurred.".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4().to_string();
        let status_code = self.status_code();

        if status_code.is_server_error() {
            error!(
                error_id = %error_id,
                code = self.code(),
                status_code = status_code.as_u16(),
                error = %self,
                "API error occurred"
            );
        } else {
            warn!(
                error_id = %error_id,
                code = self.code(),
                status_code = status_code.as_u16(),
                error = %self,
                "Request rejected"
            );
        }

        let body = ApiErrorResponse {
            success: false,
            message: self.public_message(),
            error: self.code().to_string(),
            error_id,
            timestamp: Utc::now(),
            details: None,
        };
        (status_code, Json(body)).into_response()
    }
}

impl From<ClaimsError> for ApiError {
    fn from(err: ClaimsError) -> Self {
        let message = err.to_string();
        match err {
            ClaimsError::Validation(_) => ApiError::BadRequest {
                message,
                code: codes::validation::INVALID_INPUT,
            },
            ClaimsError::InvalidTransition { .. } => ApiError::BadRequest {
                message,
                code: codes::claims::INVALID_TRANSITION,
            },
            ClaimsError::NotFound { .. } => ApiError::NotFound {
                message,
                code: codes::claims::NOT_FOUND,
            },
            ClaimsError::DuplicateInvoice { .. } => ApiError::BadRequest {
                message,
                code: codes::invoices::DUPLICATE_INVOICE,
            },
            ClaimsError::NoEligibleClaims => ApiError::BadRequest {
                message,
                code: codes::claims::NO_ELIGIBLE_CLAIMS,
            },
            ClaimsError::InvoiceNotReady(_) => ApiError::BadRequest {
                message,
                code: codes::invoices::INVOICE_NOT_READY,
            },
            ClaimsError::InvoiceLocked { .. } => ApiError::BadRequest {
                message,
                code: codes::invoices::INVOICE_LOCKED,
            },
            ClaimsError::BatchNotDraft { .. } => ApiError::BadRequest {
                message,
                code: codes::claims::BATCH_NOT_DRAFT,
            },
            ClaimsError::SubmissionInProgress { .. } => ApiError::Conflict {
                message,
                code: codes::submission::IN_PROGRESS,
            },
            ClaimsError::Export(_) | ClaimsError::Audit(_) => ApiError::Internal { message },
            ClaimsError::Persistence(db) => ApiError::Database(db),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Claims(err) => err.into(),
            GatewayError::Insurer(err) => ApiError::Gateway {
                message: err.to_string(),
            },
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::NotFound { .. } | WorkflowError::UnknownStep(_) => ApiError::NotFound {
                message,
                code: codes::claims::NOT_FOUND,
            },
            WorkflowError::InvalidStepTransition { .. } | WorkflowError::RequiredStep(_) => {
                ApiError::BadRequest {
                    message,
                    code: codes::workflow::INVALID_STEP_TRANSITION,
                }
            }
            WorkflowError::PrerequisitesNotMet { .. } => ApiError::BadRequest {
                message,
                code: codes::workflow::PREREQUISITES_NOT_MET,
            },
            WorkflowError::WorkflowClosed { .. } => ApiError::BadRequest {
                message,
                code: codes::workflow::WORKFLOW_CLOSED,
            },
            WorkflowError::AlreadyInitialized { .. } => ApiError::Conflict {
                message,
                code: codes::workflow::ALREADY_INITIALIZED,
            },
            WorkflowError::AutomationFailed { .. } => ApiError::BadRequest {
                message,
                code: codes::workflow::STEP_FAILED,
            },
            WorkflowError::Conflict(_) => ApiError::Conflict {
                message,
                code: codes::database::CONSTRAINT_VIOLATION,
            },
            WorkflowError::Claims(err) => err.into(),
            WorkflowError::Persistence(db) => ApiError::Database(db),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            message: rejection.body_text(),
            code: codes::validation::INVALID_FORMAT,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest {
            message: rejection.body_text(),
            code: codes::validation::INVALID_FORMAT,
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest {
            message: rejection.body_text(),
            code: codes::validation::INVALID_FORMAT,
        }
    }
}

/// Wrap a payload in the success envelope
pub fn api_success<T>(message: impl Into<String>, data: T) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        message: message.into(),
        data,
        metadata: None,
    }
}

pub fn api_success_with_meta<T>(
    message: impl Into<String>,
    data: T,
    metadata: ResponseMetadata,
) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        message: message.into(),
        data,
        metadata: Some(metadata),
    }
}

/// Failure envelope that still carries a payload, used for recoverable
/// submission failures so the caller keeps the submission log id
pub fn api_failure<T>(message: impl Into<String>, data: T) -> ApiResponse<T> {
    ApiResponse {
        success: false,
        message: message.into(),
        data,
        metadata: None,
    }
}
