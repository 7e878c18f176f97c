//! Identity sync against Postgres. Skipped unless DATABASE_URL is set.

mod common;

use anyhow::Result;
use nema_core::auth::{AuthUser, ProviderKind};
use nema_core::config::config;
use nema_core::database::{DatabaseError, DatabaseManager};
use nema_core::services::IdentityService;

fn clerk_user(sub: &str, username: &str) -> AuthUser {
    AuthUser {
        sub: sub.to_string(),
        username: username.to_string(),
        email: Some(format!("{}@example.com", username)),
        first_name: None,
        last_name: None,
        groups: Vec::new(),
        organization: None,
        provider: ProviderKind::Clerk,
    }
}

async fn service() -> Result<IdentityService> {
    let pool = DatabaseManager::connect_lazy(&config().database)?;
    DatabaseManager::migrate(&pool).await?;
    Ok(IdentityService::new(pool))
}

#[tokio::test]
async fn same_username_from_another_subject_is_not_merged() -> Result<()> {
    if !common::database_configured() {
        eprintln!("DATABASE_URL not set; skipping");
        return Ok(());
    }
    let identity = service().await?;
    let suffix = common::unique("").replace(' ', "");
    let username = format!("john{}", suffix);

    let first = identity.sync_user(&clerk_user(&format!("user_a{}", suffix), &username)).await?;
    assert_eq!(first.clerk_user_id.as_deref(), Some(format!("user_a{}", suffix).as_str()));

    let second = identity.sync_user(&clerk_user(&format!("user_b{}", suffix), &username)).await;
    assert!(matches!(second, Err(DatabaseError::Conflict(_))), "{:?}", second);

    // The original subject still resolves to its own row
    let again = identity.sync_user(&clerk_user(&format!("user_a{}", suffix), &username)).await?;
    assert_eq!(again.id, first.id);
    Ok(())
}

#[tokio::test]
async fn unlinked_username_row_is_adopted() -> Result<()> {
    if !common::database_configured() {
        eprintln!("DATABASE_URL not set; skipping");
        return Ok(());
    }
    let identity = service().await?;
    let suffix = common::unique("").replace(' ', "");
    let username = format!("legacy{}", suffix);

    let pool = DatabaseManager::connect_lazy(&config().database)?;
    let legacy_id: i64 = sqlx::query_scalar("INSERT INTO users (username) VALUES ($1) RETURNING id")
        .bind(&username)
        .fetch_one(&pool)
        .await?;

    let synced = identity.sync_user(&clerk_user(&format!("user_c{}", suffix), &username)).await?;
    assert_eq!(synced.id, legacy_id);
    assert_eq!(synced.clerk_user_id.as_deref(), Some(format!("user_c{}", suffix).as_str()));
    Ok(())
}
