use nema_core::{config::config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    let config = config();
    server::init_tracing(&config.log_level);
    tracing::info!("Starting Nema Core API in {:?} mode", config.environment);

    server::serve(config).await
}
