use serde::Serialize;
use sqlx::PgPool;

use crate::auth::{AuthProvider, AuthUser, OrganizationClaims};
use crate::database::models::{Organization, User};
use crate::database::DatabaseError;

/// Authenticated caller after local user/organization sync
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    #[serde(flatten)]
    pub auth: AuthUser,
    pub user_id: i64,
    pub organization_id: Option<i64>,
}

/// Mirrors identity-provider users and organizations into local tables
pub struct IdentityService {
    pool: PgPool,
}

impl IdentityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Sync user, organization and membership for a verified token
    pub async fn resolve(&self, auth: AuthUser, provider: &dyn AuthProvider) -> Result<CurrentUser, DatabaseError> {
        let user = self.sync_user(&auth).await?;

        let organization_id = match &auth.organization {
            Some(claims) => match self.sync_organization(claims, provider).await? {
                Some(org) => {
                    self.ensure_membership(org.id, user.id, "member").await?;
                    Some(org.id)
                }
                None => None,
            },
            None => {
                tracing::debug!("No organization context in token for {}", auth.username);
                None
            }
        };

        Ok(CurrentUser {
            auth,
            user_id: user.id,
            organization_id,
        })
    }

    /// Get-or-create the local user, matching by provider subject then username
    pub async fn sync_user(&self, auth: &AuthUser) -> Result<User, DatabaseError> {
        let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE clerk_user_id = $1")
            .bind(&auth.sub)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(user) = existing {
            let user = sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET email = COALESCE($2, email),
                    first_name = COALESCE($3, first_name),
                    last_name = COALESCE($4, last_name),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(user.id)
            .bind(&auth.email)
            .bind(&auth.first_name)
            .bind(&auth.last_name)
            .fetch_one(&self.pool)
            .await?;
            return Ok(user);
        }

        // A username row is adopted only when no other provider subject owns it
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (clerk_user_id, username, email, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (username) DO UPDATE
            SET clerk_user_id = EXCLUDED.clerk_user_id,
                email = COALESCE(EXCLUDED.email, users.email),
                first_name = COALESCE(EXCLUDED.first_name, users.first_name),
                last_name = COALESCE(EXCLUDED.last_name, users.last_name),
                updated_at = NOW()
            WHERE users.clerk_user_id IS NULL OR users.clerk_user_id = EXCLUDED.clerk_user_id
            RETURNING *
            "#,
        )
        .bind(&auth.sub)
        .bind(&auth.username)
        .bind(&auth.email)
        .bind(&auth.first_name)
        .bind(&auth.last_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Username {} already belongs to another identity (sub {})", auth.username, auth.sub);
            DatabaseError::Conflict(format!("Username '{}' is already linked to another account", auth.username))
        })?;

        tracing::info!("Synced user {} (id {})", user.username, user.id);
        Ok(user)
    }

    /// Find or create the organization named by token claims.
    ///
    /// Returns `None` when the claims carry neither an external id nor a slug.
    pub async fn sync_organization(
        &self,
        claims: &OrganizationClaims,
        provider: &dyn AuthProvider,
    ) -> Result<Option<Organization>, DatabaseError> {
        let Some(slug) = claims.slug.clone().or_else(|| claims.external_id.clone()) else {
            return Ok(None);
        };

        let existing = sqlx::query_as::<_, Organization>(
            r#"
            SELECT * FROM organizations
            WHERE (clerk_org_id = $1 AND $1 IS NOT NULL) OR slug = $2
            ORDER BY (clerk_org_id = $1) DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(&claims.external_id)
        .bind(&slug)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(org) = existing {
            let stale_id = claims.external_id.is_some() && org.clerk_org_id != claims.external_id;
            let stale_name = claims.name.as_ref().is_some_and(|name| *name != org.name);
            if !stale_id && !stale_name {
                return Ok(Some(org));
            }
            let org = sqlx::query_as::<_, Organization>(
                r#"
                UPDATE organizations
                SET clerk_org_id = COALESCE($2, clerk_org_id),
                    name = COALESCE($3, name),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(org.id)
            .bind(&claims.external_id)
            .bind(&claims.name)
            .fetch_one(&self.pool)
            .await?;
            tracing::info!("Updated organization {} from token claims", org.slug);
            return Ok(Some(org));
        }

        let mut name = claims.name.clone();
        if name.is_none() {
            if let Some(external_id) = &claims.external_id {
                name = match provider.organization_name(external_id).await {
                    Ok(name) => name,
                    Err(e) => {
                        tracing::warn!("Organization lookup for {} failed: {}", external_id, e);
                        None
                    }
                };
            }
        }

        let org = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (clerk_org_id, name, slug)
            VALUES ($1, $2, $3)
            ON CONFLICT (slug) DO UPDATE SET updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&claims.external_id)
        .bind(name.unwrap_or_else(|| slug.clone()))
        .bind(&slug)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Created organization {} (id {})", org.slug, org.id);
        Ok(Some(org))
    }

    /// Add the user to the organization unless a membership row already exists
    pub async fn ensure_membership(&self, organization_id: i64, user_id: i64, role: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO organization_members (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization_id, user_id) DO NOTHING
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!("Added user {} to organization {} as {}", user_id, organization_id, role);
        }
        Ok(())
    }

    pub async fn list_organizations(&self) -> Result<Vec<Organization>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE deleted = FALSE ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}
