// server.rs - process startup shared by the server binary and `nema serve`

use anyhow::Context;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use crate::auth::build_provider;
use crate::config::AppConfig;
use crate::database::{DatabaseError, DatabaseManager};
use crate::routes::app;
use crate::state::AppState;

/// `RUST_LOG` wins; otherwise the configured log level
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn,tower_http=info", default_level)));
    // A second init (tests, CLI after server) is harmless
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Lazy pool for the configured database, or a placeholder pool when none is configured
pub fn database_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    match DatabaseManager::connect_lazy(&config.database) {
        Ok(pool) => Ok(pool),
        Err(DatabaseError::ConfigMissing(key)) => {
            tracing::warn!("{} not set; database-backed routes will return 503", key);
            Ok(DatabaseManager::disconnected_pool()?)
        }
        Err(e) => Err(e).context("invalid database configuration"),
    }
}

pub async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let pool = database_pool(config)?;
    if !config.database.url.is_empty() {
        DatabaseManager::migrate_if_enabled(&pool, &config.database).await;
    }
    let auth = build_provider(config).context("failed to initialise authentication provider")?;
    Ok(AppState::new(pool, auth))
}

pub async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let state = build_state(config).await?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!(
        "Nema Core API listening on http://{} ({} mode)",
        bind_addr,
        config.environment.as_str()
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
