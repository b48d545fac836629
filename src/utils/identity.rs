// src/utils/identity.rs
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{ServiceError, SessionIdentity};

// "Verify identity, return a stable user id"
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_session(&self, token: &str) -> Result<SessionIdentity, ServiceError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

// HS256 session tokens
pub struct JwtIdentityVerifier {
    secret: String,
}

impl JwtIdentityVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    // Issues a token the way the identity provider would; used by tooling and tests
    pub fn issue_token(
        &self,
        user_id: &str,
        email: &str,
        name: Option<&str>,
        ttl: Duration,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(ttl)
            .ok_or(ServiceError::InternalServerError)?
            .timestamp() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            exp: expiration,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|_| ServiceError::InternalServerError)
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify_session(&self, token: &str) -> Result<SessionIdentity, ServiceError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("Rejected session token: {}", e);
            ServiceError::Unauthorized
        })?;

        if claims.sub.trim().is_empty() {
            return Err(ServiceError::Unauthorized);
        }

        Ok(SessionIdentity {
            user_id: claims.sub,
            email: claims.email,
            display_name: claims.name,
        })
    }
}

// Extract a bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Result<&str, ServiceError> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ServiceError::Unauthorized)
}
