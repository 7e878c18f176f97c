// handlers/auth.rs - /api/auth: token acquisition, refresh and identity introspection

use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::ApiJson;
use crate::auth::{AuthUser, MockAuthClient, ProviderKind, TokenPair};
use crate::config::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: AuthUser,
}

fn require_field(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid_field(field, "is required"));
    }
    Ok(())
}

/// POST /api/auth/login - exchange username/password for tokens
pub async fn login(State(state): State<AppState>, ApiJson(body): ApiJson<LoginRequest>) -> ApiResult<LoginResponse> {
    require_field("username", &body.username)?;
    require_field("password", &body.password)?;

    let tokens = state.auth.authenticate(&body.username, &body.password).await.map_err(|e| {
        tracing::warn!("Login failed for {}: {}", body.username, e);
        ApiError::from(e)
    })?;
    let user = state.auth.verify(&tokens.access_token).await?;

    tracing::info!("User {} logged in via {}", user.username, state.auth.kind().as_str());
    Ok(ApiResponse::success(LoginResponse { tokens, user }))
}

/// POST /api/auth/refresh - new access token from a refresh token
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> ApiResult<LoginResponse> {
    require_field("refresh_token", &body.refresh_token)?;

    let tokens = state.auth.refresh(&body.refresh_token).await?;
    let user = state.auth.verify(&tokens.access_token).await?;
    Ok(ApiResponse::success(LoginResponse { tokens, user }))
}

/// GET /api/auth/me - identity carried by the bearer token
pub async fn me(Extension(user): Extension<AuthUser>) -> ApiResponse<Value> {
    let is_admin = user.is_admin();
    let is_editor = user.is_editor();
    let full_name = user.full_name();
    let mut data = json!(user);
    data["full_name"] = json!(full_name);
    data["is_admin"] = json!(is_admin);
    data["is_editor"] = json!(is_editor);
    ApiResponse::success(data)
}

/// POST /api/auth/logout - tokens are stateless, so this only acknowledges
pub async fn logout(Extension(user): Extension<AuthUser>) -> ApiResponse<Value> {
    tracing::info!("User {} logged out", user.username);
    ApiResponse::success(json!({ "message": "Logged out successfully" }))
}

/// GET /api/auth/health - which provider is active
pub async fn auth_health(State(state): State<AppState>) -> ApiResponse<Value> {
    let config = config();
    ApiResponse::success(json!({
        "service": "authentication",
        "auth_provider": state.auth.kind().as_str(),
        "mock_auth": state.auth.kind() == ProviderKind::Mock,
        "clerk_configured": config.auth.clerk_configured(),
        "cognito_configured": config.auth.cognito_configured(),
        "environment": config.environment.as_str(),
    }))
}

/// GET /api/auth/dev/users - mock credentials, only when the mock provider is active
pub async fn dev_users(State(state): State<AppState>) -> ApiResult<Value> {
    if state.auth.kind() != ProviderKind::Mock {
        return Err(ApiError::not_found("Development users are only available with mock authentication"));
    }

    let users: Vec<Value> = MockAuthClient::users()
        .iter()
        .map(|u| {
            json!({
                "username": u.username,
                "password": u.password,
                "email": u.email,
                "groups": u.groups,
                "tenant_id": u.tenant_id,
            })
        })
        .collect();

    Ok(ApiResponse::success(json!({
        "users": users,
        "note": "Mock users for local development; password equals username",
    })))
}
