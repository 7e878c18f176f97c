use anyhow::Context;
use serde_json::json;

use crate::cli::{utils::output_success, OutputFormat};
use crate::config::config;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::connect_lazy(&config().database).context("cannot connect")?;
    DatabaseManager::migrate(&pool).await.context("migration failed")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(&pool)
        .await?;

    output_success(
        &output_format,
        "Database schema is up to date",
        Some(json!({ "applied_migrations": applied })),
    )
}
