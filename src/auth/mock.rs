use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthProvider, AuthUser, OrganizationClaims, ProviderKind, TokenPair};
use crate::config::AppConfig;

/// Development user accepted by the mock provider
#[derive(Debug, Clone, Serialize)]
pub struct MockUser {
    pub username: &'static str,
    #[serde(skip_serializing)]
    pub password: &'static str,
    pub email: &'static str,
    pub given_name: &'static str,
    pub family_name: &'static str,
    pub groups: &'static [&'static str],
    pub tenant_id: &'static str,
}

pub const MOCK_USERS: &[MockUser] = &[
    MockUser {
        username: "admin",
        password: "admin",
        email: "admin@local.dev",
        given_name: "Admin",
        family_name: "User",
        groups: &["admin", "editor"],
        tenant_id: "default",
    },
    MockUser {
        username: "editor",
        password: "editor",
        email: "editor@local.dev",
        given_name: "Editor",
        family_name: "User",
        groups: &["editor"],
        tenant_id: "default",
    },
    MockUser {
        username: "viewer",
        password: "viewer",
        email: "viewer@local.dev",
        given_name: "Viewer",
        family_name: "User",
        groups: &["viewer"],
        tenant_id: "default",
    },
    MockUser {
        username: "demo",
        password: "demo",
        email: "demo@local.dev",
        given_name: "Demo",
        family_name: "User",
        groups: &["editor"],
        tenant_id: "demo",
    },
];

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

#[derive(Debug, Serialize, Deserialize)]
pub struct MockClaims {
    pub sub: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
    pub token_use: String,
}

/// HS256 tokens signed with the configured JWT secret, for local development and tests
pub struct MockAuthClient {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl MockAuthClient {
    pub fn new(secret: impl Into<String>, access_hours: u64, refresh_days: u64) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::hours(access_hours as i64),
            refresh_ttl: Duration::days(refresh_days as i64),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.auth.jwt_secret.clone(),
            config.security.jwt_expiry_hours,
            config.security.refresh_expiry_days,
        )
    }

    pub fn users() -> &'static [MockUser] {
        MOCK_USERS
    }

    fn find_user(username: &str) -> Option<&'static MockUser> {
        MOCK_USERS.iter().find(|u| u.username == username)
    }

    /// Mint a token pair for a known mock user without checking the password
    pub fn issue_for(&self, username: &str) -> Result<TokenPair, AuthError> {
        let user = Self::find_user(username).ok_or(AuthError::InvalidCredentials)?;
        self.issue(user)
    }

    fn issue(&self, user: &MockUser) -> Result<TokenPair, AuthError> {
        let access = self.sign(self.claims(user, ACCESS, self.access_ttl))?;
        let refresh = self.sign(self.claims(user, REFRESH, self.refresh_ttl))?;
        Ok(TokenPair::bearer(access, refresh, self.access_ttl.num_seconds().max(0) as u64))
    }

    fn claims(&self, user: &MockUser, token_use: &str, ttl: Duration) -> MockClaims {
        let now = Utc::now();
        MockClaims {
            sub: user.username.to_string(),
            username: user.username.to_string(),
            email: Some(user.email.to_string()),
            given_name: Some(user.given_name.to_string()),
            family_name: Some(user.family_name.to_string()),
            groups: user.groups.iter().map(|g| g.to_string()).collect(),
            tenant_id: Some(user.tenant_id.to_string()),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            token_use: token_use.to_string(),
        }
    }

    fn sign(&self, claims: MockClaims) -> Result<String, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::Misconfigured("JWT_SECRET is empty".to_string()));
        }
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AuthError::Misconfigured(format!("token signing failed: {}", e)))
    }

    fn decode(&self, token: &str, expected_use: &str) -> Result<MockClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<MockClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)?;
        if data.claims.token_use != expected_use {
            return Err(AuthError::InvalidToken(format!("expected {} token", expected_use)));
        }
        Ok(data.claims)
    }
}

impl From<MockClaims> for AuthUser {
    fn from(claims: MockClaims) -> Self {
        // The mock tenant doubles as organization slug so local users get organization context
        let organization = claims.tenant_id.map(|tenant| OrganizationClaims {
            external_id: None,
            name: Some(title_case(&tenant)),
            slug: Some(tenant),
        });
        Self {
            sub: claims.sub,
            username: claims.username,
            email: claims.email,
            first_name: claims.given_name,
            last_name: claims.family_name,
            groups: claims.groups,
            organization,
            provider: ProviderKind::Mock,
        }
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl AuthProvider for MockAuthClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = Self::find_user(username)
            .filter(|u| u.password == password)
            .ok_or(AuthError::InvalidCredentials)?;
        tracing::info!("Mock authentication succeeded for {}", username);
        self.issue(user)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode(refresh_token, REFRESH)?;
        let user = Self::find_user(&claims.username)
            .ok_or_else(|| AuthError::InvalidToken("unknown user".to_string()))?;
        self.issue(user)
    }

    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        Ok(self.decode(token, ACCESS)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MockAuthClient {
        MockAuthClient::new("test-secret", 24, 30)
    }

    #[tokio::test]
    async fn login_then_verify() {
        let client = client();
        let tokens = client.authenticate("admin", "admin").await.unwrap();
        assert_eq!(tokens.token_type, "bearer");
        assert_eq!(tokens.expires_in, 24 * 3600);

        let user = client.verify(&tokens.access_token).await.unwrap();
        assert_eq!(user.username, "admin");
        assert!(user.is_admin());
        let org = user.organization.unwrap();
        assert_eq!(org.slug.as_deref(), Some("default"));
        assert_eq!(org.name.as_deref(), Some("Default"));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let err = client().authenticate("editor", "nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn refresh_token_cannot_be_used_as_access() {
        let client = client();
        let tokens = client.authenticate("viewer", "viewer").await.unwrap();
        assert!(client.verify(&tokens.refresh_token).await.is_err());

        let renewed = client.refresh(&tokens.refresh_token).await.unwrap();
        let user = client.verify(&renewed.access_token).await.unwrap();
        assert_eq!(user.username, "viewer");
        assert!(!user.is_editor());
    }

    #[tokio::test]
    async fn other_secret_fails_verification() {
        let tokens = client().issue_for("demo").unwrap();
        let other = MockAuthClient::new("different", 24, 30);
        assert!(matches!(other.verify(&tokens.access_token).await, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn expired_token_is_reported() {
        let client = MockAuthClient::new("test-secret", 0, 30);
        let user = MockAuthClient::find_user("admin").unwrap();
        let mut claims = client.claims(user, ACCESS, Duration::hours(0));
        claims.exp = Utc::now().timestamp() - 3600;
        let token = client.sign(claims).unwrap();
        assert!(matches!(client.verify(&token).await, Err(AuthError::TokenExpired)));
    }
}
