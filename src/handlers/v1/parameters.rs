use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgConnection;

use super::{in_workspace, parse_enum, required_text};
use crate::api::{push_filter, ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::Parameter;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::services::CurrentUser;
use crate::state::AppState;
use crate::types::ParamType;

const LIST: ListSpec = ListSpec::newest_first(&["name", "description"]);

#[derive(Debug, Default, Deserialize)]
pub struct ParameterFilters {
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    pub group_id: Option<i64>,
    pub author_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: Option<String>,
    pub value: Option<Value>,
    pub group_id: Option<i64>,
    pub metadata: Option<Value>,
}

/// Used for both in-place updates and new versions
#[derive(Debug, Default, Deserialize)]
pub struct ParameterChanges {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub param_type: Option<ParamType>,
    pub description: Option<String>,
    pub value: Option<Value>,
    pub group_id: Option<i64>,
    pub metadata: Option<Value>,
}

impl ParameterChanges {
    fn apply(self, mut param: Parameter) -> Parameter {
        if let Some(name) = self.name {
            param.name = name.trim().to_string();
        }
        if let Some(param_type) = self.param_type {
            param.param_type = param_type.as_str().to_string();
        }
        if self.description.is_some() {
            param.description = self.description;
        }
        if self.value.is_some() {
            param.value = self.value;
        }
        if self.group_id.is_some() {
            param.group_id = self.group_id;
        }
        if let Some(metadata) = self.metadata {
            param.metadata = metadata;
        }
        param
    }
}

/// Value must match the declared type; stored type text is trusted to parse
fn check_value(param_type: &str, value: Option<&Value>) -> Result<(), ApiError> {
    let param_type = parse_enum("type", param_type, ParamType::parse)?;
    match value {
        Some(value) if !param_type.accepts(value) => Err(ApiError::invalid_field(
            "value",
            format!("does not match parameter type '{}'", param_type),
        )),
        _ => Ok(()),
    }
}

async fn fetch_parameter(
    conn: &mut PgConnection,
    workspace_id: i64,
    param_id: i64,
    for_update: bool,
) -> Result<Parameter, ApiError> {
    let sql = if for_update {
        "SELECT * FROM params WHERE id = $1 AND workspace_id = $2 FOR UPDATE"
    } else {
        "SELECT * FROM params WHERE id = $1 AND workspace_id = $2"
    };
    sqlx::query_as::<_, Parameter>(sql)
        .bind(param_id)
        .bind(workspace_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Parameter not found"))
}

async fn check_group(conn: &mut PgConnection, workspace_id: i64, group_id: Option<i64>) -> Result<(), ApiError> {
    let Some(group_id) = group_id else {
        return Ok(());
    };
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM groups WHERE id = $1 AND workspace_id = $2")
        .bind(group_id)
        .bind(workspace_id)
        .fetch_optional(conn)
        .await?;
    found
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Group not found in this workspace"))
}

/// GET /api/v1/workspaces/:workspace_id/parameters
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
    ApiQuery(filters): ApiQuery<ParameterFilters>,
) -> ApiResult<Page<Parameter>> {
    let mut conditions = in_workspace(workspace.id());
    if let Some(param_type) = filters.param_type.as_deref() {
        conditions.insert("type".into(), parse_enum("type", param_type, ParamType::parse)?.as_str().into());
    }
    push_filter(&mut conditions, "group_id", filters.group_id);
    push_filter(&mut conditions, "author_id", filters.author_id);

    let request = query.into_request(&LIST, conditions)?;
    let (items, total) = Repository::<Parameter>::new("params", "Parameter", state.pool.clone())
        .select_page(request.filter)
        .await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/parameters
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(body): ApiJson<CreateParameter>,
) -> ApiResult<Parameter> {
    let name = required_text("name", &body.name)?;
    check_value(body.param_type.as_str(), body.value.as_ref())?;

    let mut tx = state.pool.begin().await?;
    check_group(&mut tx, workspace.id(), body.group_id).await?;

    let inserted: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO params (workspace_id, author_id, name, type, description, value, group_id, version_number, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8)
        RETURNING id
        "#,
    )
    .bind(workspace.id())
    .bind(current.user_id)
    .bind(name)
    .bind(body.param_type.as_str())
    .bind(&body.description)
    .bind(&body.value)
    .bind(body.group_id)
    .bind(body.metadata.clone().unwrap_or_else(|| json!({})))
    .fetch_one(&mut *tx)
    .await?;

    let parameter = sqlx::query_as::<_, Parameter>("UPDATE params SET base_param_id = id WHERE id = $1 RETURNING *")
        .bind(inserted)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!("Parameter {} created in workspace {}", parameter.id, workspace.id());
    Ok(ApiResponse::created(parameter))
}

/// GET /api/v1/workspaces/:workspace_id/parameters/:param_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, param_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Parameter> {
    let mut conn = state.pool.acquire().await?;
    let parameter = fetch_parameter(&mut conn, workspace.id(), param_id, false).await?;
    Ok(ApiResponse::success(parameter))
}

/// PUT /api/v1/workspaces/:workspace_id/parameters/:param_id
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, param_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<ParameterChanges>,
) -> ApiResult<Parameter> {
    if let Some(name) = &body.name {
        required_text("name", name)?;
    }
    let mut tx = state.pool.begin().await?;
    let current = fetch_parameter(&mut tx, workspace.id(), param_id, true).await?;
    check_group(&mut tx, workspace.id(), body.group_id).await?;

    let param = body.apply(current);
    check_value(&param.param_type, param.value.as_ref())?;

    let updated = sqlx::query_as::<_, Parameter>(
        r#"
        UPDATE params
        SET name = $2, type = $3, description = $4, value = $5, group_id = $6, metadata = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(param.id)
    .bind(&param.name)
    .bind(&param.param_type)
    .bind(&param.description)
    .bind(&param.value)
    .bind(param.group_id)
    .bind(&param.metadata)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /api/v1/workspaces/:workspace_id/parameters/:param_id
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, param_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM params WHERE id = $1 AND workspace_id = $2")
        .bind(param_id)
        .bind(workspace.id())
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Parameter not found"));
    }
    tracing::info!("Parameter {} deleted from workspace {}", param_id, workspace.id());
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/workspaces/:workspace_id/parameters/:param_id/versions
pub async fn create_version(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    Extension(current): Extension<CurrentUser>,
    ApiPath((_, param_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<ParameterChanges>,
) -> ApiResult<Parameter> {
    if let Some(name) = &body.name {
        required_text("name", name)?;
    }
    let mut tx = state.pool.begin().await?;

    let anchor = fetch_parameter(&mut tx, workspace.id(), param_id, false).await?;
    let base_param_id = anchor.base_param_id.unwrap_or(anchor.id);
    let latest = sqlx::query_as::<_, Parameter>(
        "SELECT * FROM params WHERE base_param_id = $1 ORDER BY version_number DESC LIMIT 1 FOR UPDATE",
    )
    .bind(base_param_id)
    .fetch_optional(&mut *tx)
    .await?
    .unwrap_or(anchor);

    check_group(&mut tx, workspace.id(), body.group_id).await?;
    let latest_id = latest.id;
    let next_number = latest.version_number + 1;
    let next = body.apply(latest);
    check_value(&next.param_type, next.value.as_ref())?;

    let created = sqlx::query_as::<_, Parameter>(
        r#"
        INSERT INTO params (
            workspace_id, base_param_id, prev_version, author_id, name, type, description, value,
            group_id, version_number, metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(workspace.id())
    .bind(base_param_id)
    .bind(latest_id)
    .bind(current.user_id)
    .bind(&next.name)
    .bind(&next.param_type)
    .bind(&next.description)
    .bind(&next.value)
    .bind(next.group_id)
    .bind(next_number)
    .bind(&next.metadata)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(
        "Parameter {} version {} created (base {})",
        created.id,
        created.version_number,
        base_param_id
    );
    Ok(ApiResponse::created(created))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_must_match_type() {
        assert!(check_value("number", Some(&json!(12.5))).is_ok());
        assert!(check_value("number", Some(&json!("12.5"))).is_err());
        assert!(check_value("boolean", None).is_ok());
        assert!(check_value("matrix", None).is_err());
    }

    #[test]
    fn type_field_uses_wire_name() {
        let body: CreateParameter = serde_json::from_value(json!({
            "name": "max_rpm",
            "type": "number",
            "value": 3000
        }))
        .unwrap();
        assert_eq!(body.param_type, ParamType::Number);

        let changes: ParameterChanges = serde_json::from_value(json!({ "type": "array" })).unwrap();
        assert_eq!(changes.param_type, Some(ParamType::Array));
    }
}
