//! JWT claims provider
//!
//! Access tokens are issued by the account service (outside this crate) as
//! HS256 JWTs carrying `Uid`, `UserType` and `Name`. This module turns a
//! bearer token into a [`Caller`].

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Caller, Role};
use crate::types::{EngineError, Result};

/// Claims embedded in access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "Uid")]
    pub uid: String,
    #[serde(rename = "UserType")]
    pub user_type: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Email", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Validates bearer tokens and yields caller identities
#[derive(Clone)]
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Decode and verify a token
    pub fn validate(&self, token: &str) -> Result<Caller> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| EngineError::Unauthorized(format!("Invalid token: {}", e)))?;
        let claims = data.claims;
        let role: Role = claims
            .user_type
            .parse()
            .map_err(|_| EngineError::Unauthorized(format!("Unknown role: {}", claims.user_type)))?;

        debug!(uid = %claims.uid, role = ?role, "Token validated");
        Ok(Caller::new(claims.uid, role, claims.name))
    }

    /// Issue a token for `caller` (dev tooling and tests)
    pub fn issue(&self, caller: &Caller, ttl_seconds: i64) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            uid: caller.user_id.clone(),
            user_type: match caller.role {
                Role::Admin => "ADMIN".to_string(),
                Role::User => "USER".to_string(),
            },
            name: caller.display_name.clone(),
            email: None,
            exp: now + ttl_seconds,
            iat: now,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| EngineError::InvalidArgument(format!("Failed to sign token: {}", e)))
    }
}

/// Strip an optional `Bearer ` prefix from an authorization value
pub fn extract_token(value: &str) -> &str {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim()
}
