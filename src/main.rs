//! Routewatch server
//!
//! Scores payment routes for failure risk and walks risky entities through
//! the on-call guard escalation cycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use routewatch::{
    clock::SystemClock,
    config::Config,
    create_router, db,
    escalation::RiskOrchestrator,
    prediction::PredictionService,
    scheduler,
    store::{PgStore, RelayDispatcher, Stores},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "routewatch=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Routewatch starting ({})...", config.environment);
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    if config.relays.is_empty() {
        tracing::warn!("No notification relay configured, guard and escalation messages will not be sent");
    }

    // Wire services
    let dispatcher = RelayDispatcher::new(pool.clone(), config.relays.clone())
        .context("Failed to build notification dispatcher")?;
    let stores = Stores::postgres(Arc::new(PgStore::new(pool)), Arc::new(dispatcher));
    let clock = Arc::new(SystemClock);

    let predictions = Arc::new(PredictionService::new(stores.clone(), clock.clone()));
    let orchestrator = Arc::new(RiskOrchestrator::new(
        stores,
        predictions.clone(),
        clock,
        config.orchestrator_settings(),
    ));

    let sweeps = scheduler::start(orchestrator.clone(), config.scheduler_config());

    // Build router
    let state = AppState {
        config: config.clone(),
        predictions,
        orchestrator,
    };
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeps.stop().await;
    tracing::info!("Routewatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
