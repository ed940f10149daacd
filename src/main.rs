// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::Handle;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use poll_service::store::PgStore;
use poll_service::{create_router, db, AppState, Config};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal(handle: Handle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Load environment variables from .env file
    init_tracing();

    let config = Config::from_env()?;

    let state = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url, config.max_connections)
                .await
                .context("failed to connect to the database")?;
            db::migrate(&pool).await.context("failed to run migrations")?;
            info!(max_connections = config.max_connections, "database ready");
            AppState::new(Arc::new(PgStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; data endpoints will answer 500");
            AppState::unconfigured()
        }
    };

    let app = create_router(state);
    let addr = config.bind_addr();
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!(%addr, "listening");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
