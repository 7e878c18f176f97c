use axum::{extract::State, Extension};
use serde::Deserialize;

use super::{in_workspace, optional_text, required_text, unique_conflict};
use crate::api::{ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::Tag;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::state::AppState;

const LIST: ListSpec = ListSpec::by_name(&["name"]);

#[derive(Debug, Deserialize)]
pub struct CreateTag {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// `#RGB` or `#RRGGBB` (leading `#` optional), returned as upper-case with `#`.
/// Empty input means no color.
pub fn normalize_color(color: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(color) = color.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let hex = color.strip_prefix('#').unwrap_or(color);
    if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::invalid_field(
            "color",
            "must be a valid hex color code (e.g., #FF5733 or #F53)",
        ));
    }
    Ok(Some(format!("#{}", hex.to_ascii_uppercase())))
}

fn duplicate(name: &str) -> impl FnOnce() -> String + '_ {
    move || format!("Tag with name '{}' already exists in this workspace", name)
}

/// GET /api/v1/workspaces/:workspace_id/tags
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<Tag>> {
    let request = query.into_request(&LIST, in_workspace(workspace.id()))?;
    let (items, total) = Repository::<Tag>::new("tags", "Tag", state.pool.clone())
        .select_page(request.filter)
        .await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/tags
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiJson(body): ApiJson<CreateTag>,
) -> ApiResult<Tag> {
    let name = required_text("name", &body.name)?;
    let color = normalize_color(body.color.as_deref())?;

    let tag = sqlx::query_as::<_, Tag>("INSERT INTO tags (workspace_id, name, color) VALUES ($1, $2, $3) RETURNING *")
        .bind(workspace.id())
        .bind(name)
        .bind(color)
        .fetch_one(&state.pool)
        .await
        .map_err(|e| unique_conflict(e, duplicate(name)))?;

    tracing::info!("Tag '{}' created in workspace {}", tag.name, workspace.id());
    Ok(ApiResponse::created(tag))
}

/// GET /api/v1/workspaces/:workspace_id/tags/:tag_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, tag_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Tag> {
    let tag = Repository::<Tag>::new("tags", "Tag", state.pool.clone())
        .find_in_workspace(workspace.id(), tag_id)
        .await?;
    Ok(ApiResponse::success(tag))
}

/// PUT /api/v1/workspaces/:workspace_id/tags/:tag_id
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, tag_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<UpdateTag>,
) -> ApiResult<Tag> {
    let name = optional_text("name", body.name.as_deref())?;
    let color = normalize_color(body.color.as_deref())?;

    let tag = sqlx::query_as::<_, Tag>(
        r#"
        UPDATE tags
        SET name = COALESCE($3, name),
            color = COALESCE($4, color)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(tag_id)
    .bind(workspace.id())
    .bind(name)
    .bind(color)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| unique_conflict(e, duplicate(name.unwrap_or_default())))?
    .ok_or_else(|| ApiError::not_found("Tag not found in this workspace"))?;

    Ok(ApiResponse::success(tag))
}

/// DELETE /api/v1/workspaces/:workspace_id/tags/:tag_id - detaches it from requirements
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, tag_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM tags WHERE id = $1 AND workspace_id = $2")
        .bind(tag_id)
        .bind(workspace.id())
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Tag not found in this workspace"));
    }
    tracing::info!("Tag {} deleted from workspace {}", tag_id, workspace.id());
    Ok(ApiResponse::no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_normalized() {
        assert_eq!(normalize_color(Some("#ff5733")).unwrap().as_deref(), Some("#FF5733"));
        assert_eq!(normalize_color(Some("f53")).unwrap().as_deref(), Some("#F53"));
        assert_eq!(normalize_color(Some(" #AbC ")).unwrap().as_deref(), Some("#ABC"));
        assert_eq!(normalize_color(None).unwrap(), None);
        assert_eq!(normalize_color(Some("")).unwrap(), None);
    }

    #[test]
    fn malformed_colors_are_rejected() {
        for bad in ["#12", "#1234", "#GGGGGG", "red", "##FFF"] {
            assert!(normalize_color(Some(bad)).is_err(), "{} should be rejected", bad);
        }
    }
}
