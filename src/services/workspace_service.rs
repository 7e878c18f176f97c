use serde_json::Value;
use sqlx::PgPool;

use crate::database::models::Workspace;
use crate::database::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("No organization context available")]
    NoOrganization,
    #[error("Access denied to this workspace")]
    AccessDenied,
    #[error("Workspace {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for WorkspaceError {
    fn from(err: sqlx::Error) -> Self {
        WorkspaceError::Database(err.into())
    }
}

pub struct WorkspaceService {
    pool: PgPool,
}

impl WorkspaceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check that the caller's organization is linked to the workspace and return it
    pub async fn validate_workspace_access(
        &self,
        organization_id: Option<i64>,
        workspace_id: i64,
    ) -> Result<Workspace, WorkspaceError> {
        let organization_id = organization_id.ok_or(WorkspaceError::NoOrganization)?;

        let linked: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM organization_workspaces
            WHERE organization_id = $1 AND workspace_id = $2 AND deleted = FALSE
            "#,
        )
        .bind(organization_id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        if linked.is_none() {
            tracing::warn!(
                "Organization {} does not have access to workspace {}",
                organization_id,
                workspace_id
            );
            return Err(WorkspaceError::AccessDenied);
        }

        self.get(workspace_id).await
    }

    pub async fn get(&self, workspace_id: i64) -> Result<Workspace, WorkspaceError> {
        sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = $1")
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WorkspaceError::NotFound(workspace_id))
    }

    pub async fn list_for_organization(&self, organization_id: i64) -> Result<Vec<Workspace>, WorkspaceError> {
        Ok(sqlx::query_as::<_, Workspace>(
            r#"
            SELECT w.* FROM workspaces w
            JOIN organization_workspaces ow ON ow.workspace_id = w.id
            WHERE ow.organization_id = $1 AND ow.deleted = FALSE
            ORDER BY w.created_at DESC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Create a workspace owned by the organization and prepare its public-id sequences
    pub async fn create_workspace(
        &self,
        organization_id: i64,
        name: &str,
        description: Option<&str>,
        metadata: Value,
    ) -> Result<Workspace, WorkspaceError> {
        let mut tx = self.pool.begin().await?;

        let workspace = sqlx::query_as::<_, Workspace>(
            "INSERT INTO workspaces (name, description, metadata) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(name)
        .bind(description)
        .bind(metadata)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO organization_workspaces (organization_id, workspace_id, role) VALUES ($1, $2, 'owner')")
            .bind(organization_id)
            .bind(workspace.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("SELECT create_workspace_sequences($1)")
            .bind(workspace.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!("Created workspace {} for organization {}", workspace.id, organization_id);
        Ok(workspace)
    }

    pub async fn update(
        &self,
        workspace_id: i64,
        name: Option<&str>,
        description: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<Workspace, WorkspaceError> {
        sqlx::query_as::<_, Workspace>(
            r#"
            UPDATE workspaces
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                metadata = COALESCE($4, metadata),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(name)
        .bind(description)
        .bind(metadata)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WorkspaceError::NotFound(workspace_id))
    }

    /// Delete the workspace; every workspace-scoped table cascades
    pub async fn delete(&self, workspace_id: i64) -> Result<(), WorkspaceError> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = $1")
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(WorkspaceError::NotFound(workspace_id));
        }
        tracing::info!("Deleted workspace {}", workspace_id);
        Ok(())
    }
}
