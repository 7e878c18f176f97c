//! Module releases. A release has no workspace column; scope comes from the owning module.

use axum::{extract::State, Extension};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{optional_text, required_text, unique_conflict};
use crate::api::{push_filter, ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::Release;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::state::AppState;

const LIST: ListSpec = ListSpec::newest_first(&["name", "version", "description"]);

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseFilters {
    pub module_id: Option<i64>,
    pub draft: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRelease {
    pub module_id: i64,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    #[serde(default = "default_draft")]
    pub draft: bool,
    pub release_date: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

fn default_draft() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateRelease {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishRelease {
    pub release_date: Option<DateTime<Utc>>,
}

/// Published releases are immutable
fn ensure_draft(release: &Release, action: &str) -> Result<(), ApiError> {
    if release.draft {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Cannot {} published release", action)))
    }
}

/// Date recorded on publish: explicit date, then a date set while drafting, then now
fn publish_date(requested: Option<DateTime<Utc>>, existing: Option<DateTime<Utc>>) -> DateTime<Utc> {
    requested.or(existing).unwrap_or_else(Utc::now)
}

fn duplicate_version(version: &str) -> impl FnOnce() -> String + '_ {
    move || format!("Release version '{}' already exists for this module", version)
}

async fn module_in_workspace(state: &AppState, workspace_id: i64, module_id: i64) -> Result<(), ApiError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM modules WHERE id = $1 AND workspace_id = $2")
        .bind(module_id)
        .bind(workspace_id)
        .fetch_optional(&state.pool)
        .await?;
    found
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Module not found in this workspace"))
}

async fn fetch_release(state: &AppState, workspace_id: i64, release_id: i64) -> Result<Release, ApiError> {
    sqlx::query_as::<_, Release>(
        r#"
        SELECT r.* FROM releases r
        JOIN modules m ON m.id = r.module_id
        WHERE r.id = $1 AND m.workspace_id = $2
        "#,
    )
    .bind(release_id)
    .bind(workspace_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Release not found in this workspace"))
}

/// GET /api/v1/workspaces/:workspace_id/releases
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
    ApiQuery(filters): ApiQuery<ReleaseFilters>,
) -> ApiResult<Page<Release>> {
    let module_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM modules WHERE workspace_id = $1")
        .bind(workspace.id())
        .fetch_all(&state.pool)
        .await?;

    let mut conditions = Map::new();
    conditions.insert("module_id".into(), json!({ "$in": module_ids }));
    push_filter(&mut conditions, "draft", filters.draft);
    if let Some(module_id) = filters.module_id {
        conditions.insert("$and".into(), json!([{ "module_id": module_id }]));
    }

    let request = query.into_request(&LIST, conditions)?;
    let (items, total) = Repository::<Release>::new("releases", "Release", state.pool.clone())
        .select_page(request.filter)
        .await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/releases - chained to the module's latest release
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiJson(body): ApiJson<CreateRelease>,
) -> ApiResult<Release> {
    let name = required_text("name", &body.name)?;
    let version = required_text("version", &body.version)?;
    module_in_workspace(&state, workspace.id(), body.module_id).await?;

    let release = sqlx::query_as::<_, Release>(
        r#"
        INSERT INTO releases (module_id, prev_release, name, version, description, draft, release_date, metadata)
        VALUES (
            $1,
            (SELECT id FROM releases WHERE module_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1),
            $2, $3, $4, $5, $6, $7
        )
        RETURNING *
        "#,
    )
    .bind(body.module_id)
    .bind(name)
    .bind(version)
    .bind(&body.description)
    .bind(body.draft)
    .bind(body.release_date)
    .bind(body.metadata.clone().unwrap_or_else(|| json!({})))
    .fetch_one(&state.pool)
    .await
    .map_err(|e| unique_conflict(e, duplicate_version(version)))?;

    tracing::info!(
        "Release {} ({} {}) created for module {}",
        release.id,
        release.public_id.as_deref().unwrap_or("-"),
        release.version,
        release.module_id
    );
    Ok(ApiResponse::created(release))
}

/// GET /api/v1/workspaces/:workspace_id/releases/:release_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, release_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Release> {
    let release = fetch_release(&state, workspace.id(), release_id).await?;
    Ok(ApiResponse::success(release))
}

/// PUT /api/v1/workspaces/:workspace_id/releases/:release_id - drafts only
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, release_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<UpdateRelease>,
) -> ApiResult<Release> {
    let name = optional_text("name", body.name.as_deref())?;
    let version = optional_text("version", body.version.as_deref())?;
    let release = fetch_release(&state, workspace.id(), release_id).await?;
    ensure_draft(&release, "modify")?;

    let updated = sqlx::query_as::<_, Release>(
        r#"
        UPDATE releases
        SET name = COALESCE($2, name),
            version = COALESCE($3, version),
            description = COALESCE($4, description),
            release_date = COALESCE($5, release_date),
            metadata = COALESCE($6, metadata)
        WHERE id = $1 AND draft = TRUE
        RETURNING *
        "#,
    )
    .bind(release.id)
    .bind(name)
    .bind(version)
    .bind(&body.description)
    .bind(body.release_date)
    .bind(&body.metadata)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| unique_conflict(e, duplicate_version(version.unwrap_or(&release.version))))?
    .ok_or_else(|| ApiError::bad_request("Cannot modify published release"))?;

    Ok(ApiResponse::success(updated))
}

/// DELETE /api/v1/workspaces/:workspace_id/releases/:release_id - drafts only
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, release_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let release = fetch_release(&state, workspace.id(), release_id).await?;
    ensure_draft(&release, "delete")?;

    let result = sqlx::query("DELETE FROM releases WHERE id = $1 AND draft = TRUE")
        .bind(release.id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::bad_request("Cannot delete published release"));
    }
    tracing::info!("Release {} deleted", release.id);
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/workspaces/:workspace_id/releases/:release_id/publish
pub async fn publish(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, release_id)): ApiPath<(i64, i64)>,
    body: Option<ApiJson<PublishRelease>>,
) -> ApiResult<Release> {
    let release = fetch_release(&state, workspace.id(), release_id).await?;
    if !release.draft {
        return Err(ApiError::bad_request("Release is already published"));
    }
    let requested = body.and_then(|ApiJson(b)| b.release_date);
    let release_date = publish_date(requested, release.release_date);

    let published = sqlx::query_as::<_, Release>(
        "UPDATE releases SET draft = FALSE, release_date = $2 WHERE id = $1 AND draft = TRUE RETURNING *",
    )
    .bind(release.id)
    .bind(release_date)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::bad_request("Release is already published"))?;

    tracing::info!(
        "Release {} ({}) published",
        published.id,
        published.public_id.as_deref().unwrap_or("-")
    );
    Ok(ApiResponse::success(published))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn release(draft: bool) -> Release {
        Release {
            id: 1,
            module_id: 2,
            prev_release: None,
            public_id: Some("REL-1".to_string()),
            name: "First".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            draft,
            release_date: None,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn published_releases_are_frozen() {
        assert!(ensure_draft(&release(true), "modify").is_ok());
        let err = ensure_draft(&release(false), "delete").unwrap_err();
        assert_eq!(err.message(), "Cannot delete published release");
    }

    #[test]
    fn publish_date_precedence() {
        let requested = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let drafted = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(publish_date(Some(requested), Some(drafted)), requested);
        assert_eq!(publish_date(None, Some(drafted)), drafted);

        let before = Utc::now();
        assert!(publish_date(None, None) >= before);
    }
}
