//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints for the DevWrite auth
//! service. It includes:
//! - Auth API endpoints (signup, login, refresh, logout variants)
//! - Authentication middleware and the JSON error envelope
//! - CORS and request tracing layers

pub mod auth;
pub mod middleware;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid access token)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, server_config: &ServerConfig) -> Router {
    let origins: Vec<HeaderValue> = server_config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::COOKIE,
            HeaderName::from_static(auth::DEVICE_ID_HEADER),
            HeaderName::from_static(auth::REFRESH_TOKEN_HEADER),
        ])
        .allow_credentials(true);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - Liveness probe and welcome message
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Welcome to the DevWrite!" }))
}
