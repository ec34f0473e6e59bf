use std::time::Duration;

use claims_service::ClaimsError;
use thiserror::Error;

/// Failure talking to the insurer API
#[derive(Error, Debug)]
pub enum InsurerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Insurer did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Insurer rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Insurer has no record of {0}")]
    NotFound(String),

    #[error("Malformed insurer response: {0}")]
    MalformedResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl InsurerError {
    /// Error body worth keeping on the submission log
    pub fn response_payload(&self) -> Option<serde_json::Value> {
        match self {
            InsurerError::Rejected { status, body } => Some(
                serde_json::from_str(body)
                    .unwrap_or_else(|_| serde_json::json!({ "status": status, "body": body })),
            ),
            InsurerError::Timeout(after) => {
                Some(serde_json::json!({ "timeout_ms": after.as_millis() }))
            }
            _ => None,
        }
    }
}

/// Failure of a gateway operation before or after the insurer call
///
/// Insurer failures during a submission are not errors: they are reported as a
/// failed [`SubmissionResult`](crate::SubmissionResult) and the claim stays
/// resubmittable.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Claims(#[from] ClaimsError),

    #[error("Submission gateway error: {0}")]
    Insurer(#[from] InsurerError),
}

impl GatewayError {
    pub fn is_client_error(&self) -> bool {
        match self {
            GatewayError::Claims(err) => err.is_client_error(),
            GatewayError::Insurer(_) => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_body_is_kept_as_json() {
        let err = InsurerError::Rejected {
            status: 422,
            body: r#"{"error":"invalid member"}"#.into(),
        };
        let payload = err.response_payload().unwrap();
        assert_eq!(payload["error"], "invalid member");
    }

    #[test]
    fn test_plain_text_rejection_is_wrapped() {
        let err = InsurerError::Rejected {
            status: 503,
            body: "Service Unavailable".into(),
        };
        let payload = err.response_payload().unwrap();
        assert_eq!(payload["status"], 503);
        assert_eq!(payload["body"], "Service Unavailable");
    }

    #[test]
    fn test_business_errors_are_client_errors() {
        let err = GatewayError::from(ClaimsError::InvoiceNotReady("no invoice".into()));
        assert!(err.is_client_error());
        let err = GatewayError::from(InsurerError::Config("missing base url".into()));
        assert!(!err.is_client_error());
    }
}
