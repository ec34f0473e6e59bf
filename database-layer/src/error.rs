use thiserror::Error;

/// Postgres SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Row decode failed: {0}")]
    Decode(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Database error: {0}")]
    SqlxError(sqlx::Error),
}

impl DatabaseError {
    /// True when this error is a unique violation on the named constraint or index
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, DatabaseError::UniqueViolation { constraint } if constraint == name)
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return DatabaseError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                };
            }
        }
        match err {
            sqlx::Error::ColumnDecode { index, source } => {
                DatabaseError::Decode(format!("column {index}: {source}"))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionFailed(err.to_string())
            }
            other => DatabaseError::SqlxError(other),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationError(err.to_string())
    }
}

/// A stored text value that does not name any variant of the target enum
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {type_name} value '{value}'")]
pub struct UnknownVariant {
    pub type_name: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(type_name: &'static str, value: impl Into<String>) -> Self {
        Self {
            type_name,
            value: value.into(),
        }
    }
}

impl From<UnknownVariant> for DatabaseError {
    fn from(err: UnknownVariant) -> Self {
        DatabaseError::Decode(err.to_string())
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_matching() {
        let err = DatabaseError::UniqueViolation {
            constraint: "uq_sha_invoices_open_claim".to_string(),
        };
        assert!(err.is_unique_violation("uq_sha_invoices_open_claim"));
        assert!(!err.is_unique_violation("uq_sha_workflow_instances_claim"));
        assert!(!DatabaseError::QueryFailed("x".into()).is_unique_violation("uq_sha_invoices_open_claim"));
    }

    #[test]
    fn test_row_not_found_is_not_reclassified() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DatabaseError::SqlxError(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_pool_timeout_maps_to_connection_failure() {
        let err: DatabaseError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DatabaseError::ConnectionFailed(_)));
    }

    #[test]
    fn test_unknown_variant_becomes_decode_error() {
        let err: DatabaseError = UnknownVariant::new("ClaimStatus", "archived").into();
        assert_eq!(
            err.to_string(),
            "Row decode failed: unknown ClaimStatus value 'archived'"
        );
    }
}
