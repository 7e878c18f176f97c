// handlers/v1/products.rs - products and their default/shared modules

use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::api::{ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::Product;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::services::product_service::{
    DeletionPreview, NewProduct, ProductCreation, ProductDetails, ProductService, ProductUpdate,
};
use crate::state::AppState;

const LIST: ListSpec = ListSpec::newest_first(&["name", "description"]);

#[derive(Debug, Default, Deserialize)]
pub struct ShowQuery {
    #[serde(default)]
    pub include_details: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProductView {
    Plain(Product),
    Detailed(ProductDetails),
}

/// GET /api/v1/workspaces/:workspace_id/products
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<ProductDetails>> {
    let mut conditions = Map::new();
    conditions.insert("workspace_id".to_string(), workspace.id().into());
    let request = query.into_request(&LIST, conditions)?;

    let (products, total) = Repository::<Product>::new("products", "Product", state.pool.clone())
        .select_page(request.filter)
        .await?;
    let items = ProductService::new(state.pool).with_details(products).await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/products - create with default module and collection
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiJson(body): ApiJson<NewProduct>,
) -> ApiResult<ProductCreation> {
    if body.name.trim().is_empty() {
        return Err(ApiError::invalid_field("name", "is required"));
    }
    let default_module_created = body.create_default_module;
    let creation = ProductService::new(state.pool)
        .create_product_with_defaults(workspace.id(), body)
        .await?;
    Ok(ApiResponse::created(creation).with_meta("default_module_created", default_module_created))
}

/// GET /api/v1/workspaces/:workspace_id/products/:product_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, product_id)): ApiPath<(i64, i64)>,
    ApiQuery(query): ApiQuery<ShowQuery>,
) -> ApiResult<ProductView> {
    let service = ProductService::new(state.pool);
    let view = if query.include_details {
        ProductView::Detailed(service.get_product_with_details(workspace.id(), product_id).await?)
    } else {
        ProductView::Plain(service.get_product(workspace.id(), product_id).await?)
    };
    Ok(ApiResponse::success(view))
}

/// PUT /api/v1/workspaces/:workspace_id/products/:product_id
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, product_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<ProductUpdate>,
) -> ApiResult<ProductDetails> {
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::invalid_field("name", "must not be empty"));
    }
    let service = ProductService::new(state.pool);
    service.update_product(workspace.id(), product_id, body).await?;
    let details = service.get_product_with_details(workspace.id(), product_id).await?;
    Ok(ApiResponse::success(details))
}

/// GET /api/v1/workspaces/:workspace_id/products/:product_id/deletion-preview
pub async fn deletion_preview(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, product_id)): ApiPath<(i64, i64)>,
) -> ApiResult<DeletionPreview> {
    let preview = ProductService::new(state.pool)
        .get_product_deletion_preview(workspace.id(), product_id)
        .await?;
    Ok(ApiResponse::success(preview))
}

/// DELETE /api/v1/workspaces/:workspace_id/products/:product_id
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, product_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    ProductService::new(state.pool)
        .delete_product(workspace.id(), product_id)
        .await?;
    Ok(ApiResponse::no_content())
}
