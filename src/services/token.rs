//! Token codec
//!
//! Signs and verifies the two bearer-token kinds:
//! - Access tokens: stateless, short-lived, carry user identity claims.
//! - Refresh tokens: reference a session row by ID, long-lived.
//!
//! The two token kinds are signed with independent secrets so that
//! compromise of one key does not compromise the other. All
//! verification failures (malformed, expired, mis-signed) collapse to
//! a single `TokenError::Invalid`; callers learn nothing about why a
//! token was rejected.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    pub sub: i64,
    /// User email
    pub email: String,
    /// User display name
    pub name: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Claims carried by a refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User ID
    pub sub: i64,
    /// Session row ID backing this token
    pub sid: String,
    /// Device identifier hash the session is scoped to
    pub dev: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Token codec errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature, expiry, or structure check failed
    #[error("Invalid or expired token")]
    Invalid,

    /// Signing failed (key or serialization problem)
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Signs and verifies access and refresh tokens.
///
/// Construct once from `AuthConfig` and share; holds the derived
/// signing keys and TTLs. Core logic never reads ambient process
/// state for secrets.
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Create a codec from auth configuration
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
        }
    }

    /// Issue a signed access token for the given user identity
    pub fn issue_access(&self, user_id: i64, email: &str, name: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id,
            email: email.to_string(),
            name: name.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Issue a signed refresh token bound to a session row
    pub fn issue_refresh(
        &self,
        user_id: i64,
        session_id: &str,
        device_id_hash: &str,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id,
            sid: session_id.to_string(),
            dev: device_id_hash.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify an access token and return its claims
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();

        decode::<AccessClaims>(token, &self.access_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }

    /// Verify a refresh token and return its claims
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();

        decode::<RefreshClaims>(token, &self.refresh_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}
