use database_layer::UnknownVariant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit details could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown audit action: {0}")]
    UnknownAction(#[from] UnknownVariant),
}

pub type Result<T> = std::result::Result<T, AuditError>;
