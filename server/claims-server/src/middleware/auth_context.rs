//! Authentication context extraction
//!
//! Every API route except `/health` takes an [`AuthContext`]. The extractor
//! reads `Authorization: Bearer <jwt>`, validates it with HS256 against the
//! configured secret and rejects with 401 before the handler runs.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

/// Clinic roles carried in the token
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const CLAIMS_MANAGER: &str = "claims_manager";
    pub const CLINICAL_OFFICER: &str = "clinical_officer";
    pub const RECEPTIONIST: &str = "receptionist";

    /// Claim creation
    pub const CLAIM_AUTHORS: &[&str] = &[ADMIN, CLINICAL_OFFICER];
    /// Manual claim status changes
    pub const CLAIM_EDITORS: &[&str] = &[ADMIN, CLAIMS_MANAGER, CLINICAL_OFFICER];
    /// Invoice, batch, submission and reconciliation operations
    pub const BILLING: &[&str] = &[ADMIN, CLAIMS_MANAGER];
    /// Supporting-document review and removal
    pub const DOCUMENT_REVIEWERS: &[&str] = &[ADMIN, CLAIMS_MANAGER];
    /// Claim deletion
    pub const ADMINS: &[&str] = &[ADMIN];
}

/// Token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
}

/// HS256 keys derived from `auth.jwt_secret`
#[derive(Clone)]
pub struct JwtKeys {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl JwtKeys {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            decoding: DecodingKey::from_secret(bytes),
            encoding: EncodingKey::from_secret(bytes),
        }
    }

    /// Issue a token; used by operator tooling and the API tests
    pub fn issue(&self, claims: &TokenClaims) -> Result<String, ApiError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Could not sign token: {e}")))
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| ApiError::authentication(format!("Invalid or expired token: {e}")))
    }
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Fail with 403 unless the caller holds one of `allowed`
    pub fn require_any_role(&self, allowed: &[&str]) -> Result<(), ApiError> {
        if allowed.iter().any(|role| self.has_role(role)) {
            return Ok(());
        }
        Err(ApiError::authorization(format!(
            "Requires one of the roles: {}",
            allowed.join(", ")
        )))
    }
}

fn extract_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::authentication("Missing Authorization header"))?;

    header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::authentication("Invalid Authorization header format. Expected: Bearer <token>")
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let claims = state.jwt.verify(token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::authentication("Token subject is not a user id"))?;

        tracing::debug!(user_id = %user_id, roles = ?claims.roles, "Request authenticated");
        Ok(Self {
            user_id,
            roles: claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn keys() -> JwtKeys {
        JwtKeys::new(&Secret::new("test-secret".into()))
    }

    fn claims(exp_offset: i64) -> TokenClaims {
        TokenClaims {
            sub: Uuid::new_v4().to_string(),
            roles: vec![roles::CLAIMS_MANAGER.into()],
            exp: chrono::Utc::now().timestamp() + exp_offset,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let keys = keys();
        let issued = claims(3600);
        let token = keys.issue(&issued).unwrap();
        let verified = keys.verify(&token).unwrap();
        assert_eq!(verified.sub, issued.sub);
        assert_eq!(verified.roles, issued.roles);
    }

    #[test]
    fn test_expired_and_foreign_tokens_rejected() {
        let keys = keys();
        let expired = keys.issue(&claims(-3600)).unwrap();
        assert!(matches!(
            keys.verify(&expired),
            Err(ApiError::Authentication { .. })
        ));

        let other = JwtKeys::new(&Secret::new("other-secret".into()));
        let foreign = other.issue(&claims(3600)).unwrap();
        assert!(keys.verify(&foreign).is_err());
    }

    #[test]
    fn test_role_gate() {
        let ctx = AuthContext {
            user_id: Uuid::new_v4(),
            roles: vec![roles::RECEPTIONIST.into()],
        };
        assert!(ctx.require_any_role(roles::BILLING).is_err());
        assert!(ctx.require_any_role(&[roles::RECEPTIONIST]).is_ok());
    }
}
