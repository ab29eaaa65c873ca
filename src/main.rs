use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wildpals_relay::config::ServerConfig;
use wildpals_relay::db::pool::{create_pool, run_migrations};
use wildpals_relay::relay::event_relay::EventRelay;
use wildpals_relay::web::app_state::AppState;
use wildpals_relay::web::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (TOML file + env overrides)
    let config = ServerConfig::load("wildpals.toml");

    // Initialize database
    let pool = create_pool(&config.database.url)
        .await
        .context("failed to connect to database")?;

    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    // Create the shared relay with durable message storage
    let relay = Arc::new(EventRelay::new(Some(pool.clone())));

    let app_state = Arc::new(AppState {
        relay,
        db: Some(pool),
    });

    let app = build_router(app_state);

    info!("Wildpals relay starting — {}", config.server.web_address);

    let listener = tokio::net::TcpListener::bind(&config.server.web_address)
        .await
        .context("failed to bind web listener")?;

    // Serve with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for Ctrl+C");
            info!("Shutdown signal received, stopping gracefully...");
        })
        .await
        .context("server error")?;

    info!("Wildpals relay stopped");
    Ok(())
}
