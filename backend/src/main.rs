//! Realty Backend - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use realty_backend::{
    api::{self, AppState},
    cache::MemoryPermissionCache,
    config::Config,
    db,
    error::Result,
    repository::PgAuthzRepository,
    services::{
        authorization_service::{AuthorizationService, AuthorizationSettings},
        block_sweeper::BlockSweeper,
    },
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _otel_guard = telemetry::init_tracing(&config, "realty-backend")?;
    tracing::info!(config = ?config, "Starting Realty Backend");

    let metrics_handle = match telemetry::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Metrics disabled: {}", e);
            None
        }
    };

    // Connect to database
    let db_pool = db::create_pool(&config).await?;
    tracing::info!("Connected to database");

    db::run_migrations(&db_pool).await?;
    tracing::info!("Database migrations complete");

    let repository = Arc::new(PgAuthzRepository::new(db_pool));
    let cache = Arc::new(MemoryPermissionCache::new());
    let authz = Arc::new(AuthorizationService::new(
        repository,
        cache,
        AuthorizationSettings::from_config(&config),
    ));

    let mut app_state = AppState::new(config.clone(), authz.clone());
    if let Some(handle) = metrics_handle {
        app_state.set_metrics_handle(handle);
    }

    // Lift elapsed temp blocks and age out sign-in counters in the background
    let _sweeper = BlockSweeper::new(authz)
        .with_signin_guard(app_state.signin_guard.clone())
        .spawn(config.block_sweep_interval);
    let state = Arc::new(app_state);

    let app = api::routes::create_router(state);

    // Start server
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
