use axum::{extract::State, Extension};
use serde::Deserialize;

use super::{in_workspace, optional_text, required_text, unique_conflict};
use crate::api::{ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::Group;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::state::AppState;

const LIST: ListSpec = ListSpec::by_name(&["name", "description"]);

#[derive(Debug, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroup {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn duplicate(name: &str) -> impl FnOnce() -> String + '_ {
    move || format!("Group with name '{}' already exists in this workspace", name)
}

fn groups(state: &AppState) -> Repository<Group> {
    Repository::new("groups", "Group", state.pool.clone())
}

/// GET /api/v1/workspaces/:workspace_id/groups
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<Group>> {
    let request = query.into_request(&LIST, in_workspace(workspace.id()))?;
    let (items, total) = groups(&state).select_page(request.filter).await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/groups
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiJson(body): ApiJson<CreateGroup>,
) -> ApiResult<Group> {
    let name = required_text("name", &body.name)?;
    let group = sqlx::query_as::<_, Group>(
        "INSERT INTO groups (workspace_id, name, description) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(workspace.id())
    .bind(name)
    .bind(&body.description)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| unique_conflict(e, duplicate(name)))?;

    tracing::info!("Group '{}' created in workspace {}", group.name, workspace.id());
    Ok(ApiResponse::created(group))
}

/// GET /api/v1/workspaces/:workspace_id/groups/:group_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, group_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Group> {
    let group = groups(&state).find_in_workspace(workspace.id(), group_id).await?;
    Ok(ApiResponse::success(group))
}

/// PUT /api/v1/workspaces/:workspace_id/groups/:group_id
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, group_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<UpdateGroup>,
) -> ApiResult<Group> {
    let name = optional_text("name", body.name.as_deref())?;
    let group = sqlx::query_as::<_, Group>(
        r#"
        UPDATE groups
        SET name = COALESCE($3, name),
            description = COALESCE($4, description)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(group_id)
    .bind(workspace.id())
    .bind(name)
    .bind(&body.description)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| unique_conflict(e, duplicate(name.unwrap_or_default())))?
    .ok_or_else(|| ApiError::not_found("Group not found in this workspace"))?;

    Ok(ApiResponse::success(group))
}

/// DELETE /api/v1/workspaces/:workspace_id/groups/:group_id - member parameters become ungrouped
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, group_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM groups WHERE id = $1 AND workspace_id = $2")
        .bind(group_id)
        .bind(workspace.id())
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Group not found in this workspace"));
    }
    tracing::info!("Group {} deleted from workspace {}", group_id, workspace.id());
    Ok(ApiResponse::no_content())
}
