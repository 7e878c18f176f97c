use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::auth::{parse_bearer, AuthUser};
use crate::error::ApiError;
use crate::services::IdentityService;
use crate::state::AppState;

/// Verify the bearer token with the configured provider and inject `AuthUser`
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?;
        parse_bearer(header)?.to_string()
    };

    let user = state.auth.verify(&token).await.map_err(|e| {
        tracing::debug!("Token rejected: {}", e);
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Sync the authenticated user and organization into local tables and inject `CurrentUser`.
///
/// Must run after `require_auth`.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let current = IdentityService::new(state.pool.clone())
        .resolve(auth, state.auth.as_ref())
        .await?;

    request.extensions_mut().insert(current);
    Ok(next.run(request).await)
}
