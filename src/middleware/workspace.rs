use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};

use crate::database::models::Workspace;
use crate::error::ApiError;
use crate::services::{CurrentUser, WorkspaceService};
use crate::state::AppState;

/// Workspace the caller's organization was verified to access
#[derive(Debug, Clone)]
pub struct ValidatedWorkspace(pub Workspace);

impl ValidatedWorkspace {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

/// Resolve `:workspace_id` from the path and check organization access.
///
/// Must run after `resolve_identity`.
pub async fn validate_workspace(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let workspace_id = params
        .get("workspace_id")
        .ok_or_else(|| ApiError::bad_request("Missing workspace id"))?
        .parse::<i64>()
        .map_err(|_| ApiError::invalid_field("workspace_id", "must be an integer"))?;

    let organization_id = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?
        .organization_id;

    let workspace = WorkspaceService::new(state.pool.clone())
        .validate_workspace_access(organization_id, workspace_id)
        .await?;

    request.extensions_mut().insert(ValidatedWorkspace(workspace));
    Ok(next.run(request).await)
}
