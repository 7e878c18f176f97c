use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::Value;

use crate::api::{ApiJson, ApiPath};
use crate::database::models::Workspace;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{CurrentUser, WorkspaceError, WorkspaceService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWorkspace {
    pub name: String,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkspace {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

fn organization(current: &CurrentUser) -> Result<i64, ApiError> {
    current
        .organization_id
        .ok_or_else(|| ApiError::from(WorkspaceError::NoOrganization))
}

/// GET /api/v1/workspaces - list, empty when no organization is selected
pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Vec<Workspace>> {
    let Some(organization_id) = current.organization_id else {
        return Ok(ApiResponse::success(Vec::new()).with_meta("message", "No organization selected"));
    };
    let workspaces = WorkspaceService::new(state.pool)
        .list_for_organization(organization_id)
        .await?;
    Ok(ApiResponse::success(workspaces))
}

/// POST /api/v1/workspaces - create and link to the caller's organization
pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(body): ApiJson<CreateWorkspace>,
) -> ApiResult<Workspace> {
    let organization_id = organization(&current)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_field("name", "is required"));
    }

    let workspace = WorkspaceService::new(state.pool)
        .create_workspace(
            organization_id,
            name,
            body.description.as_deref(),
            body.metadata.unwrap_or_else(|| serde_json::json!({})),
        )
        .await?;
    Ok(ApiResponse::created(workspace))
}

/// GET /api/v1/workspaces/:workspace_id
pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(workspace_id): ApiPath<i64>,
) -> ApiResult<Workspace> {
    let workspace = WorkspaceService::new(state.pool)
        .validate_workspace_access(current.organization_id, workspace_id)
        .await?;
    Ok(ApiResponse::success(workspace))
}

/// PUT /api/v1/workspaces/:workspace_id
pub async fn update(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(workspace_id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateWorkspace>,
) -> ApiResult<Workspace> {
    let service = WorkspaceService::new(state.pool);
    service
        .validate_workspace_access(current.organization_id, workspace_id)
        .await?;
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::invalid_field("name", "must not be empty"));
    }
    let workspace = service
        .update(workspace_id, body.name.as_deref(), body.description.as_deref(), body.metadata)
        .await?;
    Ok(ApiResponse::success(workspace))
}

/// DELETE /api/v1/workspaces/:workspace_id
pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiPath(workspace_id): ApiPath<i64>,
) -> ApiResult<()> {
    let service = WorkspaceService::new(state.pool);
    service
        .validate_workspace_access(current.organization_id, workspace_id)
        .await?;
    service.delete(workspace_id).await?;
    Ok(ApiResponse::no_content())
}
