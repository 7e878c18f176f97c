use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{in_workspace, optional_text, required_text};
use crate::api::{push_filter, ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::{Module, ReqCollection};
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::state::AppState;

const LIST: ListSpec = ListSpec::newest_first(&["name", "description"]);

#[derive(Debug, Default, Deserialize)]
pub struct ModuleFilters {
    pub product_id: Option<i64>,
    pub shared: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateModule {
    pub name: String,
    pub description: Option<String>,
    pub rules: Option<String>,
    #[serde(default)]
    pub shared: bool,
    pub metadata: Option<Value>,
    pub req_collection_id: Option<i64>,
    #[serde(default)]
    pub create_new_req_collection: bool,
    pub new_req_collection_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateModule {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rules: Option<String>,
    pub shared: Option<bool>,
    pub metadata: Option<Value>,
}

enum CollectionChoice<'a> {
    Existing(i64),
    New(String, &'a str),
}

fn collection_choice(body: &CreateModule) -> Result<CollectionChoice<'_>, ApiError> {
    match (body.req_collection_id, body.create_new_req_collection) {
        (Some(_), true) => Err(ApiError::bad_request(
            "Cannot specify both create_new_req_collection and req_collection_id",
        )),
        (None, false) => Err(ApiError::bad_request(
            "Must specify either create_new_req_collection or req_collection_id",
        )),
        (Some(id), false) => Ok(CollectionChoice::Existing(id)),
        (None, true) => {
            let name = body
                .new_req_collection_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} Requirements", body.name.trim()));
            Ok(CollectionChoice::New(name, body.name.trim()))
        }
    }
}

fn modules(state: &AppState) -> Repository<Module> {
    Repository::new("modules", "Module", state.pool.clone())
}

/// GET /api/v1/workspaces/:workspace_id/modules
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
    ApiQuery(filters): ApiQuery<ModuleFilters>,
) -> ApiResult<Page<Module>> {
    let mut conditions = in_workspace(workspace.id());
    push_filter(&mut conditions, "shared", filters.shared);

    if let Some(product_id) = filters.product_id {
        let module_ids: Vec<i64> = sqlx::query_scalar("SELECT module_id FROM product_modules WHERE product_id = $1")
            .bind(product_id)
            .fetch_all(&state.pool)
            .await?;
        conditions.insert("id".to_string(), json!({ "$in": module_ids }));
    }

    let request = query.into_request(&LIST, conditions)?;
    let (items, total) = modules(&state).select_page(request.filter).await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/modules - attach an existing collection or create one
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiJson(body): ApiJson<CreateModule>,
) -> ApiResult<Module> {
    let name = required_text("name", &body.name)?;
    let choice = collection_choice(&body)?;
    let mut tx = state.pool.begin().await?;

    let req_collection_id = match choice {
        CollectionChoice::Existing(id) => {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM req_collections WHERE id = $1 AND workspace_id = $2")
                    .bind(id)
                    .bind(workspace.id())
                    .fetch_optional(&mut *tx)
                    .await?;
            exists.ok_or_else(|| ApiError::not_found("Requirement collection not found in this workspace"))?
        }
        CollectionChoice::New(collection_name, module_name) => {
            let collection = sqlx::query_as::<_, ReqCollection>(
                "INSERT INTO req_collections (workspace_id, name, metadata) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(workspace.id())
            .bind(&collection_name)
            .bind(json!({ "created_by": "module_creation", "module_name": module_name }))
            .fetch_one(&mut *tx)
            .await?;
            tracing::info!("Created req collection {} for module '{}'", collection.id, module_name);
            collection.id
        }
    };

    let module = sqlx::query_as::<_, Module>(
        r#"
        INSERT INTO modules (workspace_id, req_collection_id, name, description, rules, shared, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(workspace.id())
    .bind(req_collection_id)
    .bind(name)
    .bind(&body.description)
    .bind(&body.rules)
    .bind(body.shared)
    .bind(body.metadata.clone().unwrap_or_else(|| json!({})))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!("Module {} created in workspace {}", module.id, workspace.id());
    Ok(ApiResponse::created(module))
}

/// GET /api/v1/workspaces/:workspace_id/modules/:module_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, module_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Module> {
    let module = modules(&state).find_in_workspace(workspace.id(), module_id).await?;
    Ok(ApiResponse::success(module))
}

/// PUT /api/v1/workspaces/:workspace_id/modules/:module_id
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, module_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<UpdateModule>,
) -> ApiResult<Module> {
    let name = optional_text("name", body.name.as_deref())?;
    let module = sqlx::query_as::<_, Module>(
        r#"
        UPDATE modules
        SET name = COALESCE($3, name),
            description = COALESCE($4, description),
            rules = COALESCE($5, rules),
            shared = COALESCE($6, shared),
            metadata = COALESCE($7, metadata)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(module_id)
    .bind(workspace.id())
    .bind(name)
    .bind(&body.description)
    .bind(&body.rules)
    .bind(body.shared)
    .bind(&body.metadata)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Module not found"))?;

    tracing::info!("Module {} updated", module.id);
    Ok(ApiResponse::success(module))
}

/// DELETE /api/v1/workspaces/:workspace_id/modules/:module_id
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, module_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM modules WHERE id = $1 AND workspace_id = $2")
        .bind(module_id)
        .bind(workspace.id())
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Module not found"));
    }
    tracing::info!("Module {} deleted from workspace {}", module_id, workspace.id());
    Ok(ApiResponse::no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> CreateModule {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn collection_source_must_be_exactly_one() {
        let both = body(json!({ "name": "Pumps", "req_collection_id": 3, "create_new_req_collection": true }));
        assert!(collection_choice(&both).is_err());

        let neither = body(json!({ "name": "Pumps" }));
        assert!(collection_choice(&neither).is_err());

        let existing = body(json!({ "name": "Pumps", "req_collection_id": 3 }));
        assert!(matches!(collection_choice(&existing), Ok(CollectionChoice::Existing(3))));
    }

    #[test]
    fn new_collection_name_defaults_from_module() {
        let create = body(json!({ "name": " Pumps ", "create_new_req_collection": true }));
        match collection_choice(&create) {
            Ok(CollectionChoice::New(name, module)) => {
                assert_eq!(name, "Pumps Requirements");
                assert_eq!(module, "Pumps");
            }
            _ => panic!("expected a new collection"),
        }

        let named = body(json!({
            "name": "Pumps",
            "create_new_req_collection": true,
            "new_req_collection_name": "Hydraulics"
        }));
        assert!(matches!(collection_choice(&named), Ok(CollectionChoice::New(ref n, _)) if n == "Hydraulics"));
    }
}
