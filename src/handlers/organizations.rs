use axum::{extract::State, Extension};

use crate::database::models::Organization;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{CurrentUser, IdentityService};
use crate::state::AppState;

/// GET /api/v1/organizations/debug - every non-deleted organization
pub async fn debug_list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Vec<Organization>> {
    let organizations = IdentityService::new(state.pool).list_organizations().await?;
    tracing::info!(
        "Listing {} local organizations for {}",
        organizations.len(),
        current.auth.username
    );
    let total = organizations.len();
    Ok(ApiResponse::success(organizations)
        .with_meta("total", total)
        .with_meta("current_organization_id", current.organization_id))
}
