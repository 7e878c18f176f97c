// handlers/root.rs - service information and health probes

use axum::extract::State;
use serde_json::{json, Value};

use crate::config::config;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET / - service information
pub async fn root() -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "name": "Nema Core API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/api/health",
        "endpoints": {
            "auth": "/api/auth/*",
            "organizations": "/api/v1/organizations/*",
            "workspaces": "/api/v1/workspaces[/:workspace_id]",
            "resources": "/api/v1/workspaces/:workspace_id/{products,modules,req-collections,requirements,parameters,testcases,releases,tags,groups,assets}",
        }
    }))
}

/// GET /health and /api/health - database ping, 503 when unreachable
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    if let Err(e) = DatabaseManager::health_check(&state.pool).await {
        tracing::warn!("Health check failed: {}", e);
        return Err(ApiError::service_unavailable("Database unavailable"));
    }

    Ok(ApiResponse::success(json!({
        "status": "healthy",
        "service": "nema-core",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": config().environment.as_str(),
        "database": "ok",
    })))
}
