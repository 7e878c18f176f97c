use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{in_workspace, optional_text, required_text};
use crate::api::{ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::ReqCollection;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::state::AppState;

const LIST: ListSpec = ListSpec::newest_first(&["name"]);

#[derive(Debug, Deserialize)]
pub struct CreateReqCollection {
    pub name: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReqCollection {
    pub name: Option<String>,
    pub metadata: Option<Value>,
}

fn collections(state: &AppState) -> Repository<ReqCollection> {
    Repository::new("req_collections", "Requirement collection", state.pool.clone())
}

/// GET /api/v1/workspaces/:workspace_id/req-collections
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<ReqCollection>> {
    let request = query.into_request(&LIST, in_workspace(workspace.id()))?;
    let (items, total) = collections(&state).select_page(request.filter).await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/req-collections
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiJson(body): ApiJson<CreateReqCollection>,
) -> ApiResult<ReqCollection> {
    let name = required_text("name", &body.name)?;
    let collection = sqlx::query_as::<_, ReqCollection>(
        "INSERT INTO req_collections (workspace_id, name, metadata) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(workspace.id())
    .bind(name)
    .bind(body.metadata.unwrap_or_else(|| json!({})))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!("Req collection {} created in workspace {}", collection.id, workspace.id());
    Ok(ApiResponse::created(collection))
}

/// GET /api/v1/workspaces/:workspace_id/req-collections/:collection_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, collection_id)): ApiPath<(i64, i64)>,
) -> ApiResult<ReqCollection> {
    let collection = collections(&state).find_in_workspace(workspace.id(), collection_id).await?;
    Ok(ApiResponse::success(collection))
}

/// PUT /api/v1/workspaces/:workspace_id/req-collections/:collection_id
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, collection_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<UpdateReqCollection>,
) -> ApiResult<ReqCollection> {
    let name = optional_text("name", body.name.as_deref())?;
    let collection = sqlx::query_as::<_, ReqCollection>(
        r#"
        UPDATE req_collections
        SET name = COALESCE($3, name),
            metadata = COALESCE($4, metadata)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(collection_id)
    .bind(workspace.id())
    .bind(name)
    .bind(&body.metadata)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Requirement collection not found"))?;

    Ok(ApiResponse::success(collection))
}

/// DELETE /api/v1/workspaces/:workspace_id/req-collections/:collection_id - removes its requirements too
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, collection_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM req_collections WHERE id = $1 AND workspace_id = $2")
        .bind(collection_id)
        .bind(workspace.id())
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Requirement collection not found"));
    }
    tracing::info!("Req collection {} deleted from workspace {}", collection_id, workspace.id());
    Ok(ApiResponse::no_content())
}
