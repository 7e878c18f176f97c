// handlers/v1/assets.rs - uploaded files stored under the upload directory

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, HeaderValue},
    response::Response,
    Extension,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use super::{in_workspace, optional_text};
use crate::api::{push_filter, ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::config::config;
use crate::database::models::Asset;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::services::CurrentUser;
use crate::state::AppState;

const LIST: ListSpec = ListSpec::newest_first(&["name", "description"]);

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "webp", "pdf", "doc", "docx", "txt", "md", "rtf", "zip", "tar", "gz", "7z",
    "json", "xml", "csv", "xlsx", "xls", "py", "js", "html", "css", "sql",
];

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

#[derive(Debug, Default, Deserialize)]
pub struct AssetFilters {
    pub file_type: Option<String>,
    pub creator_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAsset {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Lower-cased extension of an upload, if it is on the allow-list
pub fn allowed_extension(filename: &str) -> Result<String, ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        let shown = if extension.is_empty() { "(none)".to_string() } else { format!(".{}", extension) };
        return Err(ApiError::bad_request(format!(
            "File type {} not allowed. Allowed types: {}",
            shown,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    Ok(extension)
}

/// Path relative to the upload directory, as stored in `assets.file_path`
fn relative_path(workspace_id: i64, extension: &str) -> String {
    format!("workspace_{}/{}.{}", workspace_id, uuid::Uuid::new_v4(), extension)
}

fn absolute_path(relative: &str) -> PathBuf {
    Path::new(&config().uploads.upload_dir).join(relative)
}

fn too_large() -> ApiError {
    let limit = config().uploads.max_file_size_bytes;
    ApiError::payload_too_large(format!("File too large. Maximum size: {}MB", limit / (1024 * 1024)))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request(format!("Invalid multipart body: {}", err))
}

fn io_error(context: &str, err: std::io::Error) -> ApiError {
    tracing::error!("{}: {}", context, err);
    ApiError::internal_server_error("Failed to save uploaded file")
}

struct StoredFile {
    relative: String,
    original_name: String,
    content_type: String,
}

/// Stream the `file` field to disk, enforcing the size limit as chunks arrive
async fn store_upload(
    field: &mut axum::extract::multipart::Field<'_>,
    workspace_id: i64,
) -> Result<StoredFile, ApiError> {
    let original_name = field
        .file_name()
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("No filename provided"))?;
    let extension = allowed_extension(&original_name)?;
    let content_type = field.content_type().unwrap_or(DEFAULT_FILE_TYPE).to_string();

    let relative = relative_path(workspace_id, &extension);
    let target = absolute_path(&relative);
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_error("Failed to create upload directory", e))?;
    }

    let limit = config().uploads.max_file_size_bytes;
    let mut file = tokio::fs::File::create(&target)
        .await
        .map_err(|e| io_error("Failed to create upload file", e))?;
    let mut written = 0usize;

    let outcome: Result<(), ApiError> = async {
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            written += chunk.len();
            if written > limit {
                return Err(too_large());
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error("Failed to write upload", e))?;
        }
        file.flush().await.map_err(|e| io_error("Failed to flush upload", e))
    }
    .await;

    if let Err(err) = outcome {
        drop(file);
        remove_file(&target).await;
        return Err(err);
    }

    Ok(StoredFile {
        relative,
        original_name,
        content_type,
    })
}

struct UploadForm {
    stored: StoredFile,
    name: Option<String>,
    description: Option<String>,
}

/// Read every multipart field; a stored file is removed again when a later field fails
async fn read_upload_form(multipart: &mut Multipart, workspace_id: i64) -> Result<UploadForm, ApiError> {
    let mut stored: Option<StoredFile> = None;
    let mut name: Option<String> = None;
    let mut description: Option<String> = None;

    let outcome: Result<(), ApiError> = async {
        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "file" if stored.is_none() => stored = Some(store_upload(&mut field, workspace_id).await?),
                "name" => name = Some(field.text().await.map_err(multipart_error)?),
                "description" => description = Some(field.text().await.map_err(multipart_error)?),
                other => tracing::debug!("Ignoring multipart field '{}'", other),
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = outcome {
        if let Some(stored) = &stored {
            remove_file(&absolute_path(&stored.relative)).await;
        }
        return Err(err);
    }

    let stored = stored.ok_or_else(|| ApiError::invalid_field("file", "is required"))?;
    Ok(UploadForm { stored, name, description })
}

async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to delete asset file {}: {}", path.display(), e);
        }
    }
}

fn assets(state: &AppState) -> Repository<Asset> {
    Repository::new("assets", "Asset", state.pool.clone())
}

/// GET /api/v1/workspaces/:workspace_id/assets
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
    ApiQuery(filters): ApiQuery<AssetFilters>,
) -> ApiResult<Page<Asset>> {
    let mut conditions = in_workspace(workspace.id());
    push_filter(&mut conditions, "file_type", filters.file_type);
    push_filter(&mut conditions, "creator_id", filters.creator_id);

    let request = query.into_request(&LIST, conditions)?;
    let (items, total) = assets(&state).select_page(request.filter).await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/assets - multipart fields `file`, `name`, `description`
pub async fn upload(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> ApiResult<Asset> {
    let UploadForm { stored, name, description } = read_upload_form(&mut multipart, workspace.id()).await?;
    let asset_name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| stored.original_name.clone());

    let inserted = sqlx::query_as::<_, Asset>(
        r#"
        INSERT INTO assets (workspace_id, creator_id, name, file_path, file_type, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(workspace.id())
    .bind(current.user_id)
    .bind(&asset_name)
    .bind(&stored.relative)
    .bind(&stored.content_type)
    .bind(&description)
    .fetch_one(&state.pool)
    .await;

    let asset = match inserted {
        Ok(asset) => asset,
        Err(e) => {
            remove_file(&absolute_path(&stored.relative)).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        "Asset {} ({}) uploaded to workspace {} from '{}'",
        asset.id,
        asset.public_id.as_deref().unwrap_or("-"),
        workspace.id(),
        stored.original_name
    );
    Ok(ApiResponse::created(asset))
}

/// GET /api/v1/workspaces/:workspace_id/assets/:asset_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, asset_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Asset> {
    let asset = assets(&state).find_in_workspace(workspace.id(), asset_id).await?;
    Ok(ApiResponse::success(asset))
}

/// PUT /api/v1/workspaces/:workspace_id/assets/:asset_id - metadata only
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, asset_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<UpdateAsset>,
) -> ApiResult<Asset> {
    let name = optional_text("name", body.name.as_deref())?;
    let asset = sqlx::query_as::<_, Asset>(
        r#"
        UPDATE assets
        SET name = COALESCE($3, name),
            description = COALESCE($4, description)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(asset_id)
    .bind(workspace.id())
    .bind(name)
    .bind(&body.description)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Asset not found in this workspace"))?;

    Ok(ApiResponse::success(asset))
}

/// DELETE /api/v1/workspaces/:workspace_id/assets/:asset_id - removes the stored file as well
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, asset_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let file_path: Option<String> =
        sqlx::query_scalar("DELETE FROM assets WHERE id = $1 AND workspace_id = $2 RETURNING file_path")
            .bind(asset_id)
            .bind(workspace.id())
            .fetch_optional(&state.pool)
            .await?;
    let file_path = file_path.ok_or_else(|| ApiError::not_found("Asset not found in this workspace"))?;

    remove_file(&absolute_path(&file_path)).await;
    tracing::info!("Asset {} deleted from workspace {}", asset_id, workspace.id());
    Ok(ApiResponse::no_content())
}

/// GET /api/v1/workspaces/:workspace_id/assets/:asset_id/download
pub async fn download(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, asset_id)): ApiPath<(i64, i64)>,
) -> Result<Response, ApiError> {
    let asset = assets(&state).find_in_workspace(workspace.id(), asset_id).await?;
    let bytes = match tokio::fs::read(absolute_path(&asset.file_path)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Asset file not found on disk"));
        }
        Err(e) => return Err(io_error("Failed to read asset file", e)),
    };

    let content_type = asset.file_type.as_deref().unwrap_or(DEFAULT_FILE_TYPE);
    let filename = asset.name.replace(['"', '\\', '\r', '\n'], "_");
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static(DEFAULT_FILE_TYPE)),
    );
    if let Ok(disposition) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn extension_allow_list() {
        assert_eq!(allowed_extension("Schematic.PDF").unwrap(), "pdf");
        assert_eq!(allowed_extension("archive.tar.gz").unwrap(), "gz");
        assert_eq!(
            allowed_extension("payload.exe").unwrap_err().status_code(),
            StatusCode::BAD_REQUEST
        );
        assert!(allowed_extension("README").is_err());
    }

    #[test]
    fn stored_paths_are_per_workspace() {
        let path = relative_path(12, "png");
        assert!(path.starts_with("workspace_12/"));
        assert!(path.ends_with(".png"));
        assert_ne!(path, relative_path(12, "png"));
    }

    #[test]
    fn oversize_is_413() {
        assert_eq!(too_large().status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    fn multipart_request(body: &'static str) -> axum::extract::Request {
        axum::http::Request::post("/assets")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    async fn stored_files(workspace_id: i64) -> usize {
        let dir = absolute_path(&format!("workspace_{}", workspace_id));
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn broken_form_after_file_leaves_nothing_on_disk() {
        use axum::extract::FromRequest;

        let workspace_id = 900_000_000 + (std::process::id() as i64);
        let body = "--XBOUNDARY\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
hello\r\n\
--XBOUNDARY\r\n\
Content-Disposition: form-data; name=\"name\"\r\n\r\n\
never terminated";
        let mut multipart = Multipart::from_request(multipart_request(body), &()).await.unwrap();

        let err = read_upload_form(&mut multipart, workspace_id).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(stored_files(workspace_id).await, 0);
    }

    #[tokio::test]
    async fn missing_file_field_is_validation_error() {
        use axum::extract::FromRequest;

        let body = "--XBOUNDARY\r\n\
Content-Disposition: form-data; name=\"name\"\r\n\r\n\
Only a name\r\n\
--XBOUNDARY--\r\n";
        let mut multipart = Multipart::from_request(multipart_request(body), &()).await.unwrap();
        let err = read_upload_form(&mut multipart, 1).await.err().unwrap();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
