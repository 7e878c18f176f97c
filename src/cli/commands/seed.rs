//! Demo data for a fresh development database.
//!
//! Signs in a mock user the same way the API does, so the seeded organization and
//! membership are exactly what that user sees after logging in.

use anyhow::Context;
use clap::Args;
use serde_json::json;
use sqlx::PgPool;

use crate::auth::{AuthProvider, MockAuthClient};
use crate::cli::{utils::output_success, OutputFormat};
use crate::config::config;
use crate::database::models::Product;
use crate::database::DatabaseManager;
use crate::services::product_service::NewProduct;
use crate::services::{IdentityService, ProductService, WorkspaceService};
use crate::types::ReqLevel;

#[derive(Args, Debug)]
pub struct SeedArgs {
    #[arg(long, default_value = "admin", help = "Mock user who owns the demo data")]
    pub user: String,

    #[arg(long, default_value = "Demo Workspace")]
    pub workspace: String,

    #[arg(long, default_value = "Demo Product")]
    pub product: String,
}

/// One requirement per decomposition level, each the parent of the next
const REQUIREMENT_CHAIN: &[(ReqLevel, &str, &str)] = &[
    (ReqLevel::L0, "System capability", "The system shall manage requirements for a product line."),
    (ReqLevel::L1, "Requirement authoring", "Users shall create, edit and version requirements."),
    (ReqLevel::L2, "Version history", "Every requirement edit shall be retrievable as a prior version."),
    (ReqLevel::L3, "Version numbering", "Versions shall be numbered sequentially from 1."),
    (ReqLevel::L4, "Version identity", "All versions of a requirement shall share one public id."),
    (ReqLevel::L5, "Version listing", "Versions shall list in ascending version order."),
];

pub async fn handle(args: SeedArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::connect_lazy(&config().database).context("cannot connect")?;
    DatabaseManager::migrate(&pool).await.context("migration failed")?;

    let mock = MockAuthClient::from_config(config());
    let tokens = mock
        .issue_for(&args.user)
        .map_err(|_| anyhow::anyhow!("Unknown mock user '{}'", args.user))?;
    let auth = mock.verify(&tokens.access_token).await?;
    let current = IdentityService::new(pool.clone()).resolve(auth, &mock).await?;
    let organization_id = current
        .organization_id
        .ok_or_else(|| anyhow::anyhow!("Mock user '{}' has no organization", args.user))?;

    let workspaces = WorkspaceService::new(pool.clone());
    let workspace = match workspaces
        .list_for_organization(organization_id)
        .await?
        .into_iter()
        .find(|w| w.name == args.workspace)
    {
        Some(existing) => existing,
        None => {
            workspaces
                .create_workspace(organization_id, &args.workspace, Some("Seeded demo data"), json!({ "seeded": true }))
                .await?
        }
    };

    if let Some(product) = find_product(&pool, workspace.id, &args.product).await? {
        return output_success(
            &output_format,
            &format!("'{}' already seeded", args.product),
            Some(json!({ "workspace_id": workspace.id, "product_id": product.id })),
        );
    }

    let creation = ProductService::new(pool.clone())
        .create_product_with_defaults(
            workspace.id,
            NewProduct {
                name: args.product.clone(),
                description: Some("Seeded demo product".into()),
                metadata: None,
                create_default_module: true,
                selected_module_ids: Vec::new(),
            },
        )
        .await?;
    let collection = creation
        .req_collection
        .ok_or_else(|| anyhow::anyhow!("Product was created without a requirement collection"))?;

    let requirement_ids = seed_requirements(&pool, workspace.id, collection.id, current.user_id).await?;

    output_success(
        &output_format,
        &format!("Seeded '{}' in workspace '{}'", args.product, workspace.name),
        Some(json!({
            "organization_id": organization_id,
            "workspace_id": workspace.id,
            "product_id": creation.product.id,
            "module_id": creation.default_module.map(|m| m.id),
            "req_collection_id": collection.id,
            "requirement_ids": requirement_ids,
        })),
    )
}

async fn find_product(pool: &PgPool, workspace_id: i64, name: &str) -> anyhow::Result<Option<Product>> {
    Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE workspace_id = $1 AND name = $2")
        .bind(workspace_id)
        .bind(name)
        .fetch_optional(pool)
        .await?)
}

async fn seed_requirements(
    pool: &PgPool,
    workspace_id: i64,
    req_collection_id: i64,
    author_id: i64,
) -> anyhow::Result<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut parent: Option<i64> = None;
    let mut ids = Vec::with_capacity(REQUIREMENT_CHAIN.len());

    for (level, name, definition) in REQUIREMENT_CHAIN {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reqs (workspace_id, req_collection_id, parent_req_id, author_id, owner_id, name, definition, level, metadata)
            VALUES ($1, $2, $3, $4, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(workspace_id)
        .bind(req_collection_id)
        .bind(parent)
        .bind(author_id)
        .bind(name)
        .bind(definition)
        .bind(level.as_str())
        .bind(json!({ "seeded": true }))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE reqs SET base_req_id = id WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        parent = Some(id);
        ids.push(id);
    }

    tx.commit().await?;
    tracing::info!("Seeded {} requirements in collection {}", ids.len(), req_collection_id);
    Ok(ids)
}
