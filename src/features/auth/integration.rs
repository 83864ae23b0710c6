//! Integration tokens: HS256 JWTs signed with a shared secret.
//!
//! Machine-to-machine callers present one in the `X-Integrations-Token`
//! header. Verification is local; the session service is never called.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::core::error::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct IntegrationClaims {
    /// Name of the integration the token was issued to
    sub: String,
    iat: i64,
}

pub struct IntegrationTokens {
    secret: String,
}

impl IntegrationTokens {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Sign a token for the named integration
    pub fn issue(&self, name: &str) -> Result<String> {
        if !self.is_enabled() {
            return Err(AppError::Internal(
                "Integration secret is not configured".to_string(),
            ));
        }

        let claims = IntegrationClaims {
            sub: name.to_string(),
            iat: Utc::now().timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign integration token: {}", e)))
    }

    /// Returns the integration name when the token carries a valid signature
    pub fn verify(&self, token: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        match decode::<IntegrationClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                tracing::debug!("Rejected integration token: {}", e);
                None
            }
        }
    }
}
