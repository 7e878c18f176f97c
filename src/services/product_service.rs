//! Product lifecycle: creation with a default module and requirement collection,
//! and a cascading delete that only removes what the product itself created.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::database::models::{Module, ModuleSummary, Product, ReqCollection};
use crate::database::DatabaseError;

/// `created_by` marker stamped on entities this service creates
pub const PROVENANCE_CREATOR: &str = "product_service";

#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("Product {0} not found")]
    NotFound(i64),
    #[error("Product name already exists: {0}")]
    DuplicateName(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for ProductError {
    fn from(err: sqlx::Error) -> Self {
        ProductError::Database(err.into())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default = "default_true")]
    pub create_default_module: bool,
    #[serde(default)]
    pub selected_module_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
    /// Replaces the linked shared modules when present
    pub selected_module_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct ProductCreation {
    pub product: Product,
    pub default_module: Option<Module>,
    pub req_collection: Option<ReqCollection>,
}

#[derive(Debug, Serialize)]
pub struct ProductDetails {
    #[serde(flatten)]
    pub product: Product,
    pub default_module: Option<ModuleSummary>,
    pub modules: Vec<ModuleSummary>,
    pub total_module_requirements: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDeletion {
    pub id: i64,
    pub name: String,
    pub requirements_count: i64,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletionPreview {
    pub product_id: i64,
    pub product_name: String,
    pub modules_to_delete: Vec<ModuleDeletion>,
    pub modules_to_unlink: Vec<ModuleDeletion>,
    pub total_requirements: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct DeletionSummary {
    pub deleted_module_ids: Vec<i64>,
    pub unlinked_module_ids: Vec<i64>,
    pub deleted_req_collection_ids: Vec<i64>,
}

/// A module attached to the product, as seen by the deletion planner
#[derive(Debug, Clone, FromRow)]
pub struct ModuleCandidate {
    pub id: i64,
    pub name: String,
    pub shared: bool,
    pub metadata: Value,
    pub req_collection_id: Option<i64>,
    pub is_default: bool,
    /// Another product uses this module as default or through `product_modules`
    pub referenced_elsewhere: bool,
    pub requirement_count: i64,
}

impl ModuleCandidate {
    fn as_deletion(&self) -> ModuleDeletion {
        ModuleDeletion {
            id: self.id,
            name: self.name.clone(),
            requirements_count: self.requirement_count,
            is_default: self.is_default,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeletionPlan {
    pub delete: Vec<ModuleCandidate>,
    pub unlink: Vec<ModuleCandidate>,
}

/// Provenance metadata for entities created on behalf of a product
pub fn provenance(product_id: i64) -> Value {
    json!({
        "created_by": PROVENANCE_CREATOR,
        "product_id": product_id,
        "auto_created": true,
    })
}

/// True when `metadata` says the entity was created by this service for `product_id`
pub fn created_for_product(metadata: &Value, product_id: i64) -> bool {
    let creator = metadata.get("created_by").and_then(Value::as_str);
    let owner = match metadata.get("product_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    creator == Some(PROVENANCE_CREATOR) && owner == Some(product_id)
}

/// Decide which attached modules are removed with the product.
///
/// The default module and linked modules carrying this product's provenance are
/// deleted unless they are shared or still used by another product; everything
/// else is only unlinked.
pub fn plan_deletion(product_id: i64, candidates: Vec<ModuleCandidate>) -> DeletionPlan {
    let mut plan = DeletionPlan::default();
    for candidate in candidates {
        let owned = candidate.is_default || created_for_product(&candidate.metadata, product_id);
        if owned && !candidate.shared && !candidate.referenced_elsewhere {
            plan.delete.push(candidate);
        } else {
            plan.unlink.push(candidate);
        }
    }
    plan
}

fn map_unique(err: sqlx::Error, name: &str) -> ProductError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return ProductError::DuplicateName(name.to_string());
        }
    }
    err.into()
}

const MODULE_REQUIREMENT_COUNT: &str =
    "(SELECT COUNT(DISTINCT COALESCE(r.base_req_id, r.id)) FROM reqs r WHERE r.req_collection_id = m.req_collection_id)";

pub struct ProductService {
    pool: PgPool,
}

impl ProductService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_product_with_defaults(
        &self,
        workspace_id: i64,
        input: NewProduct,
    ) -> Result<ProductCreation, ProductError> {
        let mut tx = self.pool.begin().await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (workspace_id, name, description, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(workspace_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.metadata.clone().unwrap_or_else(|| json!({})))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, &input.name))?;

        let mut creation = ProductCreation {
            product,
            default_module: None,
            req_collection: None,
        };

        if input.create_default_module {
            let product_id = creation.product.id;
            let req_collection = sqlx::query_as::<_, ReqCollection>(
                "INSERT INTO req_collections (workspace_id, name, metadata) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(workspace_id)
            .bind(format!("{} Requirements", input.name))
            .bind(provenance(product_id))
            .fetch_one(&mut *tx)
            .await?;

            let module = sqlx::query_as::<_, Module>(
                r#"
                INSERT INTO modules (workspace_id, req_collection_id, name, description, shared, metadata)
                VALUES ($1, $2, $3, $4, FALSE, $5)
                RETURNING *
                "#,
            )
            .bind(workspace_id)
            .bind(req_collection.id)
            .bind(format!("{} Base Module", input.name))
            .bind(format!("Base module for {} product requirements", input.name))
            .bind(provenance(product_id))
            .fetch_one(&mut *tx)
            .await?;

            creation.product = sqlx::query_as::<_, Product>(
                "UPDATE products SET default_module_id = $2 WHERE id = $1 RETURNING *",
            )
            .bind(product_id)
            .bind(module.id)
            .fetch_one(&mut *tx)
            .await?;

            tracing::info!(
                "Created default module {} and collection {} for product {}",
                module.id,
                req_collection.id,
                product_id
            );
            creation.default_module = Some(module);
            creation.req_collection = Some(req_collection);
        }

        link_shared_modules(
            &mut tx,
            workspace_id,
            creation.product.id,
            creation.product.default_module_id,
            &input.selected_module_ids,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(
            "Product {} '{}' created in workspace {}",
            creation.product.id,
            creation.product.name,
            workspace_id
        );
        Ok(creation)
    }

    pub async fn get_product(&self, workspace_id: i64, product_id: i64) -> Result<Product, ProductError> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, workspace_id, product_id, false).await
    }

    pub async fn get_product_with_details(
        &self,
        workspace_id: i64,
        product_id: i64,
    ) -> Result<ProductDetails, ProductError> {
        let mut conn = self.pool.acquire().await?;
        let product = fetch_product(&mut conn, workspace_id, product_id, false).await?;
        product_details(&mut conn, product).await
    }

    /// Attach module summaries to a page of products
    pub async fn with_details(&self, products: Vec<Product>) -> Result<Vec<ProductDetails>, ProductError> {
        let mut conn = self.pool.acquire().await?;
        let mut detailed = Vec::with_capacity(products.len());
        for product in products {
            detailed.push(product_details(&mut conn, product).await?);
        }
        Ok(detailed)
    }

    pub async fn update_product(
        &self,
        workspace_id: i64,
        product_id: i64,
        update: ProductUpdate,
    ) -> Result<Product, ProductError> {
        let mut tx = self.pool.begin().await?;
        fetch_product(&mut tx, workspace_id, product_id, true).await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                metadata = COALESCE($5, metadata)
            WHERE id = $1 AND workspace_id = $2
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(workspace_id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, update.name.as_deref().unwrap_or_default()))?;

        if let Some(selected) = &update.selected_module_ids {
            sqlx::query("DELETE FROM product_modules WHERE product_id = $1")
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
            link_shared_modules(&mut tx, workspace_id, product_id, product.default_module_id, selected).await?;
        }

        tx.commit().await?;
        tracing::info!("Product {} updated", product_id);
        Ok(product)
    }

    pub async fn get_product_deletion_preview(
        &self,
        workspace_id: i64,
        product_id: i64,
    ) -> Result<DeletionPreview, ProductError> {
        let mut conn = self.pool.acquire().await?;
        let product = fetch_product(&mut conn, workspace_id, product_id, false).await?;
        let candidates = load_candidates(&mut conn, workspace_id, product_id).await?;
        let plan = plan_deletion(product_id, candidates);

        let modules_to_delete: Vec<ModuleDeletion> = plan.delete.iter().map(ModuleCandidate::as_deletion).collect();
        let total_requirements = modules_to_delete.iter().map(|m| m.requirements_count).sum();
        Ok(DeletionPreview {
            product_id,
            product_name: product.name,
            modules_to_delete,
            modules_to_unlink: plan.unlink.iter().map(ModuleCandidate::as_deletion).collect(),
            total_requirements,
        })
    }

    /// Delete the product together with the modules and collections it created
    pub async fn delete_product_cascade(
        &self,
        workspace_id: i64,
        product_id: i64,
    ) -> Result<DeletionSummary, ProductError> {
        let mut tx = self.pool.begin().await?;
        let product = fetch_product(&mut tx, workspace_id, product_id, true).await?;

        let candidates = load_candidates(&mut tx, workspace_id, product_id).await?;
        let plan = plan_deletion(product_id, candidates);
        let delete_ids: Vec<i64> = plan.delete.iter().map(|m| m.id).collect();
        let collection_ids: Vec<i64> = plan.delete.iter().filter_map(|m| m.req_collection_id).collect();

        sqlx::query("DELETE FROM product_modules WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE products SET default_module_id = NULL WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        if !delete_ids.is_empty() {
            sqlx::query("DELETE FROM modules WHERE id = ANY($1) AND workspace_id = $2")
                .bind(&delete_ids)
                .bind(workspace_id)
                .execute(&mut *tx)
                .await?;
        }

        // Collections go only when this product created them and no surviving module points at them
        let deleted_req_collection_ids: Vec<i64> = if collection_ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query_scalar(
                r#"
                DELETE FROM req_collections c
                WHERE c.id = ANY($1)
                  AND c.workspace_id = $2
                  AND c.metadata->>'created_by' = $3
                  AND c.metadata->>'product_id' = $4
                  AND NOT EXISTS (SELECT 1 FROM modules m WHERE m.req_collection_id = c.id)
                RETURNING c.id
                "#,
            )
            .bind(&collection_ids)
            .bind(workspace_id)
            .bind(PROVENANCE_CREATOR)
            .bind(product_id.to_string())
            .fetch_all(&mut *tx)
            .await?
        };

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let summary = DeletionSummary {
            deleted_module_ids: delete_ids,
            unlinked_module_ids: plan.unlink.iter().map(|m| m.id).collect(),
            deleted_req_collection_ids,
        };
        tracing::info!(
            "Product {} '{}' deleted: modules deleted {:?}, unlinked {:?}, collections deleted {:?}",
            product_id,
            product.name,
            summary.deleted_module_ids,
            summary.unlinked_module_ids,
            summary.deleted_req_collection_ids
        );
        Ok(summary)
    }

    /// Delete the product row alone; junction rows cascade and the default module reference is nulled
    pub async fn delete_product_simple(&self, workspace_id: i64, product_id: i64) -> Result<(), ProductError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND workspace_id = $2")
            .bind(product_id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ProductError::NotFound(product_id));
        }
        tracing::info!("Product {} deleted without cascade", product_id);
        Ok(())
    }

    pub async fn delete_product(&self, workspace_id: i64, product_id: i64) -> Result<(), ProductError> {
        match self.delete_product_cascade(workspace_id, product_id).await {
            Ok(_) => Ok(()),
            Err(e) if falls_back_to_simple_delete(&e) => {
                tracing::warn!("Cascade deletion of product {} failed, falling back: {}", product_id, e);
                self.delete_product_simple(workspace_id, product_id).await
            }
            Err(e) => Err(e),
        }
    }
}

/// A missing product is final; any other cascade failure retries as a plain row delete
pub fn falls_back_to_simple_delete(err: &ProductError) -> bool {
    !matches!(err, ProductError::NotFound(_))
}

async fn fetch_product(
    conn: &mut PgConnection,
    workspace_id: i64,
    product_id: i64,
    for_update: bool,
) -> Result<Product, ProductError> {
    let sql = if for_update {
        "SELECT * FROM products WHERE id = $1 AND workspace_id = $2 FOR UPDATE"
    } else {
        "SELECT * FROM products WHERE id = $1 AND workspace_id = $2"
    };
    sqlx::query_as::<_, Product>(sql)
        .bind(product_id)
        .bind(workspace_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ProductError::NotFound(product_id))
}

async fn product_details(conn: &mut PgConnection, product: Product) -> Result<ProductDetails, ProductError> {
    let default_module = match product.default_module_id {
        Some(id) => module_summaries(conn, &[id]).await?.into_iter().next(),
        None => None,
    };

    let linked_ids: Vec<i64> = sqlx::query_scalar("SELECT module_id FROM product_modules WHERE product_id = $1")
        .bind(product.id)
        .fetch_all(&mut *conn)
        .await?;
    let modules = module_summaries(conn, &linked_ids).await?;

    let total_module_requirements = default_module
        .iter()
        .chain(modules.iter())
        .map(|m| m.requirement_count)
        .sum();

    Ok(ProductDetails {
        product,
        default_module,
        modules,
        total_module_requirements,
    })
}

/// Link the given modules, keeping only shared, non-default modules of the workspace
async fn link_shared_modules(
    conn: &mut PgConnection,
    workspace_id: i64,
    product_id: i64,
    default_module_id: Option<i64>,
    selected: &[i64],
) -> Result<Vec<i64>, ProductError> {
    if selected.is_empty() {
        return Ok(Vec::new());
    }

    let eligible: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM modules WHERE workspace_id = $1 AND shared = TRUE AND id = ANY($2)",
    )
    .bind(workspace_id)
    .bind(selected)
    .fetch_all(&mut *conn)
    .await?;

    let mut linked = Vec::new();
    for module_id in selected {
        if Some(*module_id) == default_module_id || !eligible.contains(module_id) {
            tracing::warn!(
                "Skipping module {} for product {}: not a shared module of workspace {}",
                module_id,
                product_id,
                workspace_id
            );
            continue;
        }
        sqlx::query("INSERT INTO product_modules (product_id, module_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(product_id)
            .bind(module_id)
            .execute(&mut *conn)
            .await?;
        linked.push(*module_id);
    }
    Ok(linked)
}

async fn module_summaries(conn: &mut PgConnection, ids: &[i64]) -> Result<Vec<ModuleSummary>, ProductError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT m.id, m.public_id, m.name, m.description, m.shared, {} AS requirement_count \
         FROM modules m WHERE m.id = ANY($1) ORDER BY m.name",
        MODULE_REQUIREMENT_COUNT
    );
    Ok(sqlx::query_as::<_, ModuleSummary>(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?)
}

async fn load_candidates(
    conn: &mut PgConnection,
    workspace_id: i64,
    product_id: i64,
) -> Result<Vec<ModuleCandidate>, ProductError> {
    let sql = format!(
        r#"
        SELECT m.id, m.name, m.shared, m.metadata, m.req_collection_id,
               COALESCE(m.id = p.default_module_id, FALSE) AS is_default,
               (EXISTS (SELECT 1 FROM products o WHERE o.id <> p.id AND o.default_module_id = m.id)
                OR EXISTS (SELECT 1 FROM product_modules pm WHERE pm.module_id = m.id AND pm.product_id <> p.id))
                   AS referenced_elsewhere,
               {} AS requirement_count
        FROM modules m
        JOIN products p ON p.id = $1
        WHERE m.workspace_id = $2
          AND (m.id = p.default_module_id
               OR m.id IN (SELECT module_id FROM product_modules WHERE product_id = $1))
        ORDER BY is_default DESC, m.id
        "#,
        MODULE_REQUIREMENT_COUNT
    );
    Ok(sqlx::query_as::<_, ModuleCandidate>(&sql)
        .bind(product_id)
        .bind(workspace_id)
        .fetch_all(&mut *conn)
        .await?)
}
