//! Auth service
//!
//! The session lifecycle manager. Drives signup, login, refresh, and
//! the logout flows, composing the user and session repositories, the
//! password service, the device resolver, and the token codec.
//!
//! A (user, device) pair moves through three logical states:
//! NoSession -> Active -> Revoked. Revoked is terminal for a session
//! row; a new active session is always a new row.
//!
//! Refresh rotates the session on every use: the presented token's row
//! is revoked and a fresh row (with a fresh token pair) replaces it.
//! Presenting a token whose row is already revoked is treated as
//! replay of a stolen token, and every active session for that
//! (user, device) is revoked before the request is rejected. Both the
//! attacker and the victim end up locked out; the victim recovers by
//! logging in again.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{NewSession, User};
use crate::services::device::resolve_device_id;
use crate::services::password::{hash_password, verify_password};
use crate::services::token::{RefreshClaims, TokenCodec, TokenError};
use std::sync::Arc;

/// Error types for auth service operations
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    /// A required request field is absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The device identifier header is absent or empty
    #[error("Missing device identifier")]
    MissingDeviceId,

    /// Signup with an email that is already registered
    #[error("User already exists")]
    EmailTaken,

    /// Unknown email or wrong password; deliberately indistinct
    #[error("Invalid credentials provided")]
    InvalidCredentials,

    /// Invalid, expired, revoked, or replayed token
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Caller attempted to act on another user's sessions
    #[error("Operation not permitted")]
    Forbidden,

    /// Store or crypto failure
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AuthServiceError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid => AuthServiceError::InvalidToken,
            TokenError::Signing(msg) => {
                AuthServiceError::Internal(anyhow::anyhow!("Token signing failed: {}", msg))
            }
        }
    }
}

/// Input for signup
#[derive(Debug, Clone)]
pub struct SignupInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Input for login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Per-request client context for session-touching flows
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    /// Raw `X-Device-ID` header value, if present
    pub raw_device_id: Option<String>,
    /// Client user-agent string
    pub device_info: Option<String>,
    /// Client IP address
    pub ip_address: Option<String>,
}

/// Result of a flow that issues tokens
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
}

/// Session lifecycle manager
pub struct AuthService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    codec: TokenCodec,
    refresh_ttl_days: i64,
}

impl AuthService {
    /// Create a new auth service
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        codec: TokenCodec,
        refresh_ttl_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            codec,
            refresh_ttl_days,
        }
    }

    /// Register a new user and open their first session.
    ///
    /// Fails with `EmailTaken` if the email is already registered.
    pub async fn signup(
        &self,
        input: SignupInput,
        device: &DeviceContext,
    ) -> Result<IssuedTokens, AuthServiceError> {
        if input.email.trim().is_empty() {
            return Err(AuthServiceError::MissingField("email"));
        }
        if input.password.is_empty() {
            return Err(AuthServiceError::MissingField("password"));
        }
        let device_hash = resolve_device_id(device.raw_device_id.as_deref())?;

        if self.user_repo.get_by_email(&input.email).await?.is_some() {
            return Err(AuthServiceError::EmailTaken);
        }

        let password_hash = hash_password(&input.password)?;
        let user = self
            .user_repo
            .create(&User::new(
                input.email.clone(),
                password_hash,
                input.name,
                input.image,
            ))
            .await?;

        tracing::info!(user_id = user.id, email = %user.email, "New user created");

        self.open_session(&user, &device_hash, device).await
    }

    /// Verify credentials and open a fresh session for this device.
    ///
    /// Any session still active for the same (user, device) is revoked
    /// first, so a stale token for the device cannot outlive the login.
    pub async fn login(
        &self,
        input: LoginInput,
        device: &DeviceContext,
    ) -> Result<IssuedTokens, AuthServiceError> {
        if input.email.trim().is_empty() {
            return Err(AuthServiceError::MissingField("email"));
        }
        if input.password.is_empty() {
            return Err(AuthServiceError::MissingField("password"));
        }
        let device_hash = resolve_device_id(device.raw_device_id.as_deref())?;

        // Unknown email and wrong password are indistinguishable to the
        // caller (anti-enumeration).
        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await?
            .ok_or(AuthServiceError::InvalidCredentials)?;

        if !verify_password(&input.password, &user.password_hash)? {
            tracing::warn!(user_id = user.id, "Password mismatch on login");
            return Err(AuthServiceError::InvalidCredentials);
        }

        let revoked = self
            .session_repo
            .revoke_for_device(user.id, &device_hash)
            .await?;
        if revoked > 0 {
            tracing::debug!(
                user_id = user.id,
                revoked,
                "Revoked stale sessions for device on login"
            );
        }

        self.open_session(&user, &device_hash, device).await
    }

    /// Rotate a refresh token.
    ///
    /// The presented token's session row must still be active. On
    /// success the row is revoked atomically and a new session (and
    /// token pair) takes its place. A miss on the lookup, a claims
    /// mismatch, or losing the revocation race all mean the token was
    /// already spent: every session for the (user, device) is revoked
    /// and the request fails.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: &DeviceContext,
    ) -> Result<IssuedTokens, AuthServiceError> {
        let device_hash = resolve_device_id(device.raw_device_id.as_deref())?;

        let claims = self.codec.verify_refresh(refresh_token)?;

        let session = match self.session_repo.find_active_by_id(&claims.sid).await? {
            Some(session) => session,
            None => return self.reject_reuse(&claims, &device_hash).await,
        };

        // The session must belong to the claimed user and device, and
        // the presenting client must be on that device.
        if session.user_id != claims.sub
            || session.device_id_hash != claims.dev
            || claims.dev != device_hash
        {
            return self.reject_reuse(&claims, &device_hash).await;
        }

        // Atomic conditional revoke: when two callers race with the
        // same token, exactly one passes this point.
        if !self.session_repo.revoke(&session.id).await? {
            return self.reject_reuse(&claims, &device_hash).await;
        }
        self.session_repo.touch(&session.id).await?;

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await?
            .ok_or(AuthServiceError::InvalidToken)?;

        self.open_session(&user, &device_hash, device).await
    }

    /// Revoke the session behind the presented refresh token.
    ///
    /// A second logout with the same (now-revoked) token fails with
    /// `InvalidToken`; it never surfaces as an internal error.
    pub async fn logout_current(&self, refresh_token: &str) -> Result<(), AuthServiceError> {
        let claims = self.codec.verify_refresh(refresh_token)?;

        if !self.session_repo.revoke(&claims.sid).await? {
            return Err(AuthServiceError::InvalidToken);
        }

        tracing::info!(user_id = claims.sub, session_id = %claims.sid, "Session logged out");
        Ok(())
    }

    /// Revoke all of the caller's active sessions on one device.
    ///
    /// The scope is always the caller's own user ID; one user cannot
    /// revoke another user's sessions.
    pub async fn logout_device(
        &self,
        caller_user_id: i64,
        target_device_hash: &str,
    ) -> Result<i64, AuthServiceError> {
        if target_device_hash.trim().is_empty() {
            return Err(AuthServiceError::MissingField("device_id_hash"));
        }

        let revoked = self
            .session_repo
            .revoke_for_device(caller_user_id, target_device_hash)
            .await?;

        tracing::info!(
            user_id = caller_user_id,
            revoked,
            "Device sessions logged out"
        );
        Ok(revoked)
    }

    /// Revoke all of the caller's active sessions across every device
    pub async fn logout_all(&self, caller_user_id: i64) -> Result<i64, AuthServiceError> {
        let revoked = self.session_repo.revoke_for_user(caller_user_id).await?;

        tracing::info!(
            user_id = caller_user_id,
            revoked,
            "All sessions logged out"
        );
        Ok(revoked)
    }

    /// Verify an access token (used by the auth middleware)
    pub fn verify_access(
        &self,
        token: &str,
    ) -> Result<crate::services::token::AccessClaims, AuthServiceError> {
        Ok(self.codec.verify_access(token)?)
    }

    /// Create a session row and issue the access+refresh pair bound to it
    async fn open_session(
        &self,
        user: &User,
        device_hash: &str,
        device: &DeviceContext,
    ) -> Result<IssuedTokens, AuthServiceError> {
        let session = self
            .session_repo
            .create(
                &NewSession {
                    user_id: user.id,
                    device_id_hash: device_hash.to_string(),
                    device_info: device.device_info.clone(),
                    ip_address: device.ip_address.clone(),
                },
                self.refresh_ttl_days,
            )
            .await?;

        let access_token = self
            .codec
            .issue_access(user.id, &user.email, &user.display_name())?;
        let refresh_token = self
            .codec
            .issue_refresh(user.id, &session.id, device_hash)?;

        tracing::info!(
            user_id = user.id,
            session_id = %session.id,
            "Access and refresh tokens generated"
        );

        Ok(IssuedTokens {
            user_id: user.id,
            access_token,
            refresh_token,
        })
    }

    /// Fail-closed response to a spent or mismatched refresh token.
    ///
    /// Revokes every session for the (user, device) named in the
    /// still-decodable claims, bounding the blast radius of a stolen
    /// token to that one device.
    async fn reject_reuse(
        &self,
        claims: &RefreshClaims,
        presented_device_hash: &str,
    ) -> Result<IssuedTokens, AuthServiceError> {
        let mut revoked = self
            .session_repo
            .revoke_for_device(claims.sub, &claims.dev)
            .await?;
        if presented_device_hash != claims.dev {
            revoked += self
                .session_repo
                .revoke_for_device(claims.sub, presented_device_hash)
                .await?;
        }

        tracing::warn!(
            user_id = claims.sub,
            session_id = %claims.sid,
            revoked,
            "Refresh token reuse detected; device sessions revoked"
        );

        Err(AuthServiceError::InvalidToken)
    }
}
