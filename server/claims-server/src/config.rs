//! Server configuration
//!
//! Sources are layered, later ones winning:
//! 1. compiled defaults
//! 2. an optional file passed with `--config` (any format the `config` crate reads)
//! 3. `CLAIMS__<SECTION>__<KEY>` environment variables, e.g. `CLAIMS__INSURER__TIMEOUT_SECS=45`
//! 4. the legacy variables `SHA_API_URL`, `SHA_API_KEY`, `SHA_PROVIDER_CODE`, `DATABASE_URL`

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use database_layer::PoolSettings;
use error_common::PlatformError;
use insurance_service::InsurerSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Legacy variable names and the key each one overrides
const LEGACY_ENV: [(&str, &str); 4] = [
    ("SHA_API_URL", "insurer.base_url"),
    ("SHA_API_KEY", "insurer.api_key"),
    ("SHA_PROVIDER_CODE", "insurer.provider_code"),
    ("DATABASE_URL", "database.url"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub insurer: InsurerConfig,
    pub billing: BillingSettings,
    pub reconciliation: ReconciliationSettings,
    pub payment_tracking: PaymentTrackingSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsurerConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub provider_code: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingSettings {
    pub payment_terms_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub pending_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentTrackingSettings {
    pub check_interval_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.url", "")?
        .set_default("database.max_connections", 20)?
        .set_default("insurer.base_url", "https://api.sha.go.ke")?
        .set_default("insurer.api_key", "")?
        .set_default("insurer.provider_code", "CLINIC001")?
        .set_default("insurer.timeout_secs", 30)?
        .set_default("billing.payment_terms_days", 30)?
        .set_default("reconciliation.enabled", true)?
        .set_default("reconciliation.interval_secs", 900)?
        .set_default("reconciliation.pending_timeout_secs", 300)?
        .set_default("payment_tracking.check_interval_hours", 24)?
        .set_default("auth.jwt_secret", "")
}

impl AppConfig {
    /// Compiled defaults only; no file or environment is read
    pub fn from_defaults() -> Result<Self, PlatformError> {
        defaults()
            .and_then(ConfigBuilder::<DefaultState>::build)
            .and_then(Config::try_deserialize)
            .map_err(|e| PlatformError::ConfigError(e.to_string()))
    }

    /// Load every source and validate the result
    pub fn load(path: Option<&str>) -> Result<Self, PlatformError> {
        let config = Self::layered(path).map_err(|e| PlatformError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn layered(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("CLAIMS")
                .separator("__")
                .try_parsing(true),
        );
        for (var, key) in LEGACY_ENV {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    builder = builder.set_override(key, value)?;
                }
            }
        }
        builder.build()?.try_deserialize()
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.database.url.trim().is_empty() {
            return Err(PlatformError::ConfigError(
                "database.url is not set (DATABASE_URL or CLAIMS__DATABASE__URL)".into(),
            ));
        }
        if self.auth.jwt_secret.expose_secret().is_empty() {
            return Err(PlatformError::ConfigError(
                "auth.jwt_secret is not set (CLAIMS__AUTH__JWT_SECRET)".into(),
            ));
        }
        if self.insurer.timeout_secs == 0 {
            return Err(PlatformError::ConfigError(
                "insurer.timeout_secs must be positive".into(),
            ));
        }
        if self.billing.payment_terms_days < 0 {
            return Err(PlatformError::ConfigError(
                "billing.payment_terms_days cannot be negative".into(),
            ));
        }
        if self.reconciliation.enabled && self.reconciliation.interval_secs == 0 {
            return Err(PlatformError::ConfigError(
                "reconciliation.interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.database.max_connections,
            ..PoolSettings::default()
        }
    }

    pub fn insurer_settings(&self) -> InsurerSettings {
        InsurerSettings {
            base_url: self.insurer.base_url.clone(),
            api_key: self.insurer.api_key.clone(),
            provider_code: self.insurer.provider_code.clone(),
            timeout: self.insurer_timeout(),
        }
    }

    pub fn insurer_timeout(&self) -> Duration {
        Duration::from_secs(self.insurer.timeout_secs)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_secs(self.reconciliation.interval_secs)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.reconciliation.pending_timeout_secs)
    }

    pub fn payment_check_interval(&self) -> Duration {
        Duration::from_secs(self.payment_tracking.check_interval_hours.saturating_mul(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_defaults().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.insurer.base_url, "https://api.sha.go.ke");
        assert_eq!(config.insurer.provider_code, "CLINIC001");
        assert_eq!(config.insurer_timeout(), Duration::from_secs(30));
        assert_eq!(config.billing.payment_terms_days, 30);
        assert!(config.reconciliation.enabled);
        assert_eq!(config.reconciliation_interval(), Duration::from_secs(900));
        assert_eq!(config.pending_timeout(), Duration::from_secs(300));
        assert_eq!(config.payment_check_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_validation_requires_database_and_secret() {
        let mut config = AppConfig::from_defaults().unwrap();
        assert!(matches!(config.validate(), Err(PlatformError::ConfigError(_))));

        config.database.url = "postgresql://localhost/sha_claims".into();
        assert!(matches!(config.validate(), Err(PlatformError::ConfigError(_))));

        config.auth.jwt_secret = Secret::new("s3cret".into());
        assert!(config.validate().is_ok());

        config.insurer.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_insurer_settings_carry_timeout() {
        let mut config = AppConfig::from_defaults().unwrap();
        config.insurer.timeout_secs = 45;
        let settings = config.insurer_settings();
        assert_eq!(settings.timeout, Duration::from_secs(45));
        assert_eq!(settings.provider_code, "CLINIC001");
    }
}
