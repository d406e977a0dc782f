//! Authentication API endpoints
//!
//! Handles HTTP requests for the session lifecycle:
//! - POST /api/v1/auth/signup - Register and open a first session
//! - POST /api/v1/auth/login - Verify credentials, open a session
//! - POST /api/v1/auth/refresh - Rotate the refresh token
//! - POST /api/v1/auth/logout - Revoke the current session
//! - POST /api/v1/auth/logout-device - Revoke one device's sessions
//! - POST /api/v1/auth/logout-all - Revoke every session
//! - GET /api/v1/auth/me - Current caller identity
//!
//! Tokens travel as `access_token` and `refresh_token` cookies; the
//! refresh token is also accepted via the `x-refresh-token` header for
//! non-cookie clients. The client device identifier arrives in the
//! `X-Device-ID` header.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::auth::{DeviceContext, IssuedTokens, LoginInput, SignupInput};

/// Cookie holding the access token
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
/// Cookie holding the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// Header carrying the opaque client device identifier
pub const DEVICE_ID_HEADER: &str = "x-device-id";
/// Fallback header for the refresh token (non-cookie clients)
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Request body for signup
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for logout-device
#[derive(Debug, Deserialize)]
pub struct LogoutDeviceRequest {
    pub device_id_hash: String,
}

/// Response for flows that issue tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub id: i64,
}

/// Response for revocation endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct RevokedResponse {
    pub revoked: i64,
}

/// Response for GET /me
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
}

/// Build public auth routes (no access token required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

/// Build protected auth routes (require auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/logout-device", post(logout_device))
        .route("/logout-all", post(logout_all))
}

/// POST /api/v1/auth/signup - Register a new user
async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let device = device_context(&headers);
    let input = SignupInput {
        email: body.email,
        password: body.password,
        name: body.name,
        image: body.image,
    };

    let tokens = state.auth_service.signup(input, &device).await?;

    Ok((
        StatusCode::CREATED,
        auth_cookie_headers(&state, &tokens),
        Json(AuthResponse { id: tokens.user_id }),
    ))
}

/// POST /api/v1/auth/login - Verify credentials, open a session
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let device = device_context(&headers);
    let input = LoginInput {
        email: body.email,
        password: body.password,
    };

    let tokens = state.auth_service.login(input, &device).await?;

    Ok((
        StatusCode::OK,
        auth_cookie_headers(&state, &tokens),
        Json(AuthResponse { id: tokens.user_id }),
    ))
}

/// POST /api/v1/auth/refresh - Rotate the refresh token
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let device = device_context(&headers);
    let refresh_token = extract_refresh_token(&headers)
        .ok_or_else(|| ApiError::validation_error("No refresh token provided"))?;

    let tokens = state.auth_service.refresh(&refresh_token, &device).await?;

    Ok((
        StatusCode::OK,
        auth_cookie_headers(&state, &tokens),
        Json(AuthResponse { id: tokens.user_id }),
    ))
}

/// POST /api/v1/auth/logout - Revoke the current session
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = extract_refresh_token(&headers)
        .ok_or_else(|| ApiError::validation_error("No refresh token provided"))?;

    state.auth_service.logout_current(&refresh_token).await?;

    Ok((
        StatusCode::OK,
        clear_cookie_headers(&state),
        Json(serde_json::json!({ "message": "Logged out" })),
    ))
}

/// POST /api/v1/auth/logout-device - Revoke one device's sessions
///
/// The caller can only revoke their own sessions: the user scope is
/// taken from the verified access token, never from the request body.
async fn logout_device(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
    Json(body): Json<LogoutDeviceRequest>,
) -> Result<Json<RevokedResponse>, ApiError> {
    let revoked = state
        .auth_service
        .logout_device(claims.sub, &body.device_id_hash)
        .await?;

    Ok(Json(RevokedResponse { revoked }))
}

/// POST /api/v1/auth/logout-all - Revoke every session of the caller
async fn logout_all(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.auth_service.logout_all(claims.sub).await?;

    Ok((
        clear_cookie_headers(&state),
        Json(RevokedResponse { revoked }),
    ))
}

/// GET /api/v1/auth/me - Current caller identity
async fn me(
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> Json<MeResponse> {
    Json(MeResponse {
        id: claims.sub,
        email: claims.email,
        name: claims.name,
    })
}

// ============================================================================
// Header / cookie helpers
// ============================================================================

/// Build the per-request device context from inbound headers
fn device_context(headers: &HeaderMap) -> DeviceContext {
    DeviceContext {
        raw_device_id: header_string(headers, DEVICE_ID_HEADER),
        device_info: headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(String::from),
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string()),
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract the refresh token from the cookie, falling back to the
/// `x-refresh-token` header
fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("refresh_token=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    header_string(headers, REFRESH_TOKEN_HEADER)
}

fn build_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Set-Cookie headers carrying a freshly issued token pair
fn auth_cookie_headers(state: &AppState, tokens: &IssuedTokens) -> HeaderMap {
    let config = &state.auth_config;
    let mut headers = HeaderMap::new();

    let access = build_cookie(
        ACCESS_TOKEN_COOKIE,
        &tokens.access_token,
        config.access_ttl_minutes * 60,
        config.secure_cookies,
    );
    let refresh = build_cookie(
        REFRESH_TOKEN_COOKIE,
        &tokens.refresh_token,
        config.refresh_ttl_days * 24 * 60 * 60,
        config.secure_cookies,
    );

    if let Ok(value) = HeaderValue::from_str(&access) {
        headers.append(header::SET_COOKIE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&refresh) {
        headers.append(header::SET_COOKIE, value);
    }

    headers
}

/// Set-Cookie headers clearing both auth cookies
fn clear_cookie_headers(state: &AppState) -> HeaderMap {
    let secure = state.auth_config.secure_cookies;
    let mut headers = HeaderMap::new();

    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        let cookie = build_cookie(name, "", 0, secure);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::config::{AuthConfig, Config};
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::auth::AuthService;
    use crate::services::token::TokenCodec;
    use axum_test::TestServer;
    use serde_json::json;
    use std::sync::Arc;

    async fn test_server() -> TestServer {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let auth_config = AuthConfig {
            access_secret: "test-access".to_string(),
            refresh_secret: "test-refresh".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
            secure_cookies: false,
        };
        let auth_service = Arc::new(AuthService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            TokenCodec::new(&auth_config),
            auth_config.refresh_ttl_days,
        ));
        let state = AppState {
            pool,
            auth_service,
            auth_config: Arc::new(auth_config),
        };

        let mut config = Config::default();
        config.server.cors_origins = vec!["http://localhost:5173".to_string()];
        let app = api::build_router(state, &config.server);
        TestServer::new(app).expect("Failed to build test server")
    }

    fn set_cookies(response: &axum_test::TestResponse) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect()
    }

    fn cookie_value<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
        let prefix = format!("{}=", name);
        cookies
            .iter()
            .find(|c| c.starts_with(&prefix))
            .and_then(|c| c.split(';').next())
            .map(|pair| &pair[prefix.len()..])
    }

    async fn signup(server: &TestServer, email: &str, device: &str) -> axum_test::TestResponse {
        server
            .post("/api/v1/auth/signup")
            .add_header(
                header::HeaderName::from_static(DEVICE_ID_HEADER),
                HeaderValue::from_str(device).unwrap(),
            )
            .json(&json!({ "email": email, "password": "p", "name": "A" }))
            .await
    }

    #[tokio::test]
    async fn test_signup_sets_both_cookies() {
        let server = test_server().await;

        let response = signup(&server, "a@x.com", "d1").await;
        assert_eq!(response.status_code(), StatusCode::CREATED);

        let body: AuthResponse = response.json();
        assert!(body.id > 0);

        let cookies = set_cookies(&response);
        let access = cookie_value(&cookies, ACCESS_TOKEN_COOKIE).expect("access cookie");
        let refresh = cookie_value(&cookies, REFRESH_TOKEN_COOKIE).expect("refresh cookie");
        assert!(!access.is_empty());
        assert!(!refresh.is_empty());
        assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
        assert!(cookies.iter().all(|c| c.contains("SameSite=Strict")));
    }

    #[tokio::test]
    async fn test_signup_without_device_id_is_bad_request() {
        let server = test_server().await;

        let response = server
            .post("/api/v1/auth/signup")
            .json(&json!({ "email": "a@x.com", "password": "p" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_signup_conflicts() {
        let server = test_server().await;
        signup(&server, "a@x.com", "d1").await;

        let response = signup(&server, "a@x.com", "d2").await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_unauthorized() {
        let server = test_server().await;
        signup(&server, "a@x.com", "d1").await;

        let response = server
            .post("/api/v1/auth/login")
            .add_header(
                header::HeaderName::from_static(DEVICE_ID_HEADER),
                HeaderValue::from_static("d1"),
            )
            .json(&json!({ "email": "a@x.com", "password": "wrong" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

        // Unknown email produces the identical status and message
        let unknown = server
            .post("/api/v1/auth/login")
            .add_header(
                header::HeaderName::from_static(DEVICE_ID_HEADER),
                HeaderValue::from_static("d1"),
            )
            .json(&json!({ "email": "ghost@x.com", "password": "p" }))
            .await;
        assert_eq!(unknown.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.text(), response.text());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_replay_fails() {
        let server = test_server().await;
        let response = signup(&server, "a@x.com", "d1").await;
        let cookies = set_cookies(&response);
        let refresh_t0 = cookie_value(&cookies, REFRESH_TOKEN_COOKIE)
            .expect("refresh cookie")
            .to_string();

        // Rotate via the header fallback path
        let rotated = server
            .post("/api/v1/auth/refresh")
            .add_header(
                header::HeaderName::from_static(DEVICE_ID_HEADER),
                HeaderValue::from_static("d1"),
            )
            .add_header(
                header::HeaderName::from_static(REFRESH_TOKEN_HEADER),
                HeaderValue::from_str(&refresh_t0).unwrap(),
            )
            .await;
        assert_eq!(rotated.status_code(), StatusCode::OK);

        let new_cookies = set_cookies(&rotated);
        let refresh_t1 = cookie_value(&new_cookies, REFRESH_TOKEN_COOKIE).expect("refresh cookie");
        assert_ne!(refresh_t0, refresh_t1);

        // Replaying the consumed token is rejected
        let replay = server
            .post("/api/v1/auth/refresh")
            .add_header(
                header::HeaderName::from_static(DEVICE_ID_HEADER),
                HeaderValue::from_static("d1"),
            )
            .add_header(
                header::HeaderName::from_static(REFRESH_TOKEN_HEADER),
                HeaderValue::from_str(&refresh_t0).unwrap(),
            )
            .await;
        assert_eq!(replay.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_bad_request() {
        let server = test_server().await;

        let response = server
            .post("/api/v1/auth/refresh")
            .add_header(
                header::HeaderName::from_static(DEVICE_ID_HEADER),
                HeaderValue::from_static("d1"),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_logout_clears_cookies_and_second_logout_fails() {
        let server = test_server().await;
        let response = signup(&server, "a@x.com", "d1").await;
        let cookies = set_cookies(&response);
        let refresh = cookie_value(&cookies, REFRESH_TOKEN_COOKIE)
            .expect("refresh cookie")
            .to_string();

        let logout = server
            .post("/api/v1/auth/logout")
            .add_header(
                header::HeaderName::from_static(REFRESH_TOKEN_HEADER),
                HeaderValue::from_str(&refresh).unwrap(),
            )
            .await;
        assert_eq!(logout.status_code(), StatusCode::OK);

        let cleared = set_cookies(&logout);
        assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));

        let again = server
            .post("/api/v1/auth/logout")
            .add_header(
                header::HeaderName::from_static(REFRESH_TOKEN_HEADER),
                HeaderValue::from_str(&refresh).unwrap(),
            )
            .await;
        assert_eq!(again.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_requires_access_token() {
        let server = test_server().await;

        let anonymous = server.get("/api/v1/auth/me").await;
        assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

        let response = signup(&server, "a@x.com", "d1").await;
        let cookies = set_cookies(&response);
        let access = cookie_value(&cookies, ACCESS_TOKEN_COOKIE)
            .expect("access cookie")
            .to_string();

        let me = server
            .get("/api/v1/auth/me")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", access)).unwrap(),
            )
            .await;
        assert_eq!(me.status_code(), StatusCode::OK);

        let body: MeResponse = me.json();
        assert_eq!(body.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_logout_all_via_access_token() {
        let server = test_server().await;
        let response = signup(&server, "a@x.com", "d1").await;
        let cookies = set_cookies(&response);
        let access = cookie_value(&cookies, ACCESS_TOKEN_COOKIE)
            .expect("access cookie")
            .to_string();

        let logout_all = server
            .post("/api/v1/auth/logout-all")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", access)).unwrap(),
            )
            .await;
        assert_eq!(logout_all.status_code(), StatusCode::OK);

        let body: RevokedResponse = logout_all.json();
        assert_eq!(body.revoked, 1);
    }

    #[tokio::test]
    async fn test_root_health_route() {
        let server = test_server().await;

        let response = server.get("/").await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }
}
