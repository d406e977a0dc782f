//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope returned by every endpoint
//! - Authentication middleware (access-token validation)

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::services::auth::{AuthService, AuthServiceError};
use crate::services::token::AccessClaims;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: crate::db::DynDatabasePool,
    pub auth_service: Arc<AuthService>,
    pub auth_config: Arc<AuthConfig>,
}

/// Authenticated caller extracted from a verified access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessClaims);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(e: AuthServiceError) -> Self {
        match e {
            AuthServiceError::MissingField(field) => {
                ApiError::validation_error(format!("Missing required field: {}", field))
            }
            AuthServiceError::MissingDeviceId => {
                ApiError::validation_error("Missing X-Device-ID header")
            }
            AuthServiceError::EmailTaken => ApiError::conflict("User already exists."),
            AuthServiceError::InvalidCredentials => {
                ApiError::unauthorized("Invalid credentials provided.")
            }
            AuthServiceError::InvalidToken => {
                ApiError::unauthorized("Invalid or expired refresh token")
            }
            AuthServiceError::Forbidden => ApiError::forbidden("Operation not permitted"),
            AuthServiceError::Internal(e) => {
                tracing::error!("Internal auth error: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Extract the access token from the request.
///
/// Checks the `access_token` cookie first, then the Authorization
/// header (`Bearer` scheme) for non-cookie clients.
pub fn extract_access_token(request: &Request) -> Option<String> {
    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("access_token=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Authentication middleware
///
/// Verifies the access token and attaches the caller's claims to the
/// request. Stateless by design: an already-issued access token stays
/// valid until its expiry even if the session behind it was revoked.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_access_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials provided."))?;

    let claims = state
        .auth_service
        .verify_access(&token)
        .map_err(|_| ApiError::unauthorized("Invalid credentials provided."))?;

    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_access_token_from_cookie() {
        let request =
            request_with_headers(&[("cookie", "theme=dark; access_token=tok123; lang=en")]);
        assert_eq!(extract_access_token(&request).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_access_token_from_bearer() {
        let request = request_with_headers(&[("authorization", "Bearer tok456")]);
        assert_eq!(extract_access_token(&request).as_deref(), Some("tok456"));
    }

    #[test]
    fn test_cookie_takes_precedence_over_bearer() {
        let request = request_with_headers(&[
            ("cookie", "access_token=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(
            extract_access_token(&request).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn test_extract_access_token_absent() {
        let request = request_with_headers(&[]);
        assert!(extract_access_token(&request).is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (
                ApiError::internal_error("x"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_service_error_mapping() {
        let conflict: ApiError = AuthServiceError::EmailTaken.into();
        assert_eq!(conflict.error.code, "CONFLICT");

        let unauthorized: ApiError = AuthServiceError::InvalidCredentials.into();
        assert_eq!(unauthorized.error.code, "UNAUTHORIZED");

        let bad_request: ApiError = AuthServiceError::MissingDeviceId.into();
        assert_eq!(bad_request.error.code, "VALIDATION_ERROR");

        // Internal details are not leaked to the caller
        let internal: ApiError = AuthServiceError::Internal(anyhow::anyhow!("db exploded")).into();
        assert_eq!(internal.error.code, "INTERNAL_ERROR");
        assert!(!internal.error.message.contains("db exploded"));
    }
}
