use thiserror::Error;

/// Process-level errors raised while bootstrapping or running the server
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Database pool or migration failure during startup
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Network communication errors (bind, listener)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// HTTP server runtime errors
    #[error("Server error: {0}")]
    ServerError(String),

    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Log a platform error with the context it surfaced in
pub fn log_error(context: &str, error: &PlatformError) {
    tracing::error!(
        context = context,
        error = %error,
        "Platform error occurred"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::ConfigError("missing database.url".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing database.url");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: PlatformError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, PlatformError::Other(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
