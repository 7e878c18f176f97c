//! Pluggable bearer-token authentication.
//!
//! One `AuthProvider` is chosen at startup from configuration:
//! mock flag, then Clerk secret, then Cognito pool/client, then mock in development.

pub mod clerk;
pub mod cognito;
pub mod jwks;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, Environment};

pub use clerk::ClerkAuthClient;
pub use cognito::CognitoAuthClient;
pub use mock::MockAuthClient;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Password change required before login")]
    PasswordChangeRequired,

    #[error("{0}")]
    Unsupported(String),

    #[error("Identity provider error: {0}")]
    Upstream(String),

    #[error("Authentication misconfigured: {0}")]
    Misconfigured(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Upstream(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mock,
    Clerk,
    Cognito,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mock => "mock",
            ProviderKind::Clerk => "clerk",
            ProviderKind::Cognito => "cognito",
        }
    }
}

/// Organization context carried by a token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationClaims {
    /// Identity-provider organization id (Clerk `org_...`)
    pub external_id: Option<String>,
    pub slug: Option<String>,
    pub name: Option<String>,
}

/// Identity resolved from a verified token, before any local database lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub sub: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub groups: Vec<String>,
    pub organization: Option<OrganizationClaims>,
    pub provider: ProviderKind,
}

impl AuthUser {
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            _ => self.username.clone(),
        }
    }

    /// Matches both plain group names and Cognito-style `<pool>--admin` names
    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(|g| g == "admin" || g.ends_with("--admin"))
    }

    pub fn is_editor(&self) -> bool {
        self.is_admin() || self.groups.iter().any(|g| g == "editor" || g.ends_with("--editor"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Exchange credentials for tokens
    async fn authenticate(&self, username: &str, password: &str) -> Result<TokenPair, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// Verify an access token and extract the caller's identity
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;

    /// Provider-side organization display name, when the token only carries an id
    async fn organization_name(&self, _external_id: &str) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

pub type SharedAuthProvider = Arc<dyn AuthProvider>;

/// Configuration precedence for choosing a provider
pub fn select_provider_kind(config: &AppConfig) -> Result<ProviderKind, AuthError> {
    if config.auth.mock_auth_enabled {
        return Ok(ProviderKind::Mock);
    }
    if config.auth.clerk_configured() {
        return Ok(ProviderKind::Clerk);
    }
    if config.auth.cognito_configured() {
        return Ok(ProviderKind::Cognito);
    }
    if config.environment == Environment::Development {
        return Ok(ProviderKind::Mock);
    }
    Err(AuthError::Misconfigured(
        "no authentication provider configured for this environment".to_string(),
    ))
}

pub fn build_provider(config: &AppConfig) -> Result<SharedAuthProvider, AuthError> {
    let kind = select_provider_kind(config)?;
    tracing::info!("Using {} authentication provider", kind.as_str());

    let provider: SharedAuthProvider = match kind {
        ProviderKind::Mock => Arc::new(MockAuthClient::from_config(config)),
        ProviderKind::Clerk => Arc::new(ClerkAuthClient::from_config(config)?),
        ProviderKind::Cognito => Arc::new(CognitoAuthClient::from_config(config)?),
    };
    Ok(provider)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AuthError::InvalidToken("Authorization header must use Bearer token format".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidToken("Authorization header must use Bearer token format".to_string()));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken("Empty bearer token".to_string()));
    }
    Ok(token)
}
