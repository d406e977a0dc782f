//! DevWrite auth service - multi-device sessions with rotating refresh tokens

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devwrite_auth::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxSessionRepository, SqlxUserRepository},
    },
    services::{auth::AuthService, token::TokenCodec},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devwrite_auth=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DevWrite auth service...");

    // Load configuration (file values, then DEVWRITE_* env overrides)
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create repositories and services
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let codec = TokenCodec::new(&config.auth);
    let auth_service = Arc::new(AuthService::new(
        user_repo,
        session_repo,
        codec,
        config.auth.refresh_ttl_days,
    ));

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        auth_service,
        auth_config: Arc::new(config.auth.clone()),
    };

    // Build router
    let app = api::build_router(state, &config.server);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
