use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;

use super::jwks::JwksCache;
use super::{AuthError, AuthProvider, AuthUser, OrganizationClaims, ProviderKind, TokenPair};
use crate::config::{AppConfig, Environment};

const CLERK_API: &str = "https://api.clerk.com/v1";

/// Session tokens issued by Clerk. Sign-in happens in the Clerk frontend, so this
/// provider only verifies tokens and looks up organizations.
pub struct ClerkAuthClient {
    secret_key: String,
    verify_signatures: bool,
    http: reqwest::Client,
    jwks: JwksCache,
}

impl ClerkAuthClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, AuthError> {
        let secret_key = config
            .auth
            .clerk_secret_key
            .clone()
            .ok_or_else(|| AuthError::Misconfigured("CLERK_SECRET_KEY is not set".to_string()))?;
        let verify_signatures = config.environment != Environment::Development;
        if !verify_signatures {
            tracing::warn!("Clerk tokens are decoded without signature verification in development");
        }

        let http = reqwest::Client::new();
        let jwks = JwksCache::new(format!("{}/jwks", CLERK_API), Some(secret_key.clone()), http.clone());
        Ok(Self {
            secret_key,
            verify_signatures,
            http,
            jwks,
        })
    }

    async fn decode_claims(&self, token: &str) -> Result<Value, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;

        if self.verify_signatures {
            return self.jwks.verify::<Value>(token, &validation).await;
        }

        validation.insecure_disable_signature_validation();
        let data = decode::<Value>(token, &DecodingKey::from_secret(&[]), &validation)?;
        Ok(data.claims)
    }
}

/// Map Clerk session claims onto the provider-neutral user
pub fn user_from_claims(claims: &Value) -> Result<AuthUser, AuthError> {
    let str_claim = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);
    let public_metadata = claims.get("public_metadata");
    let metadata_claim = |key: &str| {
        public_metadata
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let sub = str_claim("sub").ok_or_else(|| AuthError::InvalidToken("token has no subject".to_string()))?;
    let email = str_claim("email");
    let username = str_claim("username")
        .or_else(|| email.as_deref().and_then(|e| e.split('@').next()).map(str::to_string))
        .unwrap_or_else(|| sub.clone());

    let org_id = str_claim("org_id")
        .or_else(|| str_claim("organization_id"))
        .or_else(|| metadata_claim("organization_id"));
    let org_slug = str_claim("org_slug")
        .or_else(|| str_claim("organization_slug"))
        .or_else(|| metadata_claim("organization_slug"));
    let organization = if org_id.is_some() || org_slug.is_some() {
        Some(OrganizationClaims {
            external_id: org_id,
            slug: org_slug,
            name: str_claim("org_name"),
        })
    } else {
        None
    };

    let groups = match str_claim("org_role") {
        // Clerk roles look like "org:admin"
        Some(role) => vec![role.rsplit(':').next().unwrap_or(&role).to_string()],
        None => vec![],
    };

    Ok(AuthUser {
        sub,
        username,
        email,
        first_name: str_claim("given_name").or_else(|| str_claim("first_name")),
        last_name: str_claim("family_name").or_else(|| str_claim("last_name")),
        groups,
        organization,
        provider: ProviderKind::Clerk,
    })
}

#[async_trait]
impl AuthProvider for ClerkAuthClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Clerk
    }

    async fn authenticate(&self, _username: &str, _password: &str) -> Result<TokenPair, AuthError> {
        Err(AuthError::Unsupported(
            "Password login is not available with Clerk; sign in through the Clerk frontend".to_string(),
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, AuthError> {
        Err(AuthError::Unsupported("Clerk sessions are refreshed by the Clerk frontend".to_string()))
    }

    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.decode_claims(token).await?;
        let user = user_from_claims(&claims)?;
        tracing::debug!(
            "Clerk token verified for {} (org: {:?})",
            user.username,
            user.organization.as_ref().and_then(|o| o.external_id.as_deref())
        );
        Ok(user)
    }

    async fn organization_name(&self, external_id: &str) -> Result<Option<String>, AuthError> {
        let response = self
            .http
            .get(format!("{}/organizations/{}", CLERK_API, external_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => {
                let body: Value = response.json().await?;
                let name = body.get("name").and_then(Value::as_str).map(str::to_string);
                tracing::info!("Fetched organization {} from Clerk: {:?}", external_id, name);
                Ok(name)
            }
            reqwest::StatusCode::NOT_FOUND => {
                tracing::warn!("Organization {} not found in Clerk", external_id);
                Ok(None)
            }
            status => Err(AuthError::Upstream(format!("Clerk organization lookup returned {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_org_from_top_level_claims() {
        let user = user_from_claims(&json!({
            "sub": "user_2abc",
            "email": "jane@acme.io",
            "org_id": "org_123",
            "org_slug": "acme",
            "org_role": "org:admin"
        }))
        .unwrap();
        assert_eq!(user.username, "jane");
        let org = user.organization.clone().unwrap();
        assert_eq!(org.external_id.as_deref(), Some("org_123"));
        assert_eq!(org.slug.as_deref(), Some("acme"));
        assert!(user.is_admin());
    }

    #[test]
    fn falls_back_to_public_metadata_and_sub() {
        let user = user_from_claims(&json!({
            "sub": "user_9",
            "public_metadata": { "organization_id": "org_9", "organization_slug": "nine" }
        }))
        .unwrap();
        assert_eq!(user.username, "user_9");
        assert_eq!(user.organization.unwrap().slug.as_deref(), Some("nine"));
    }

    #[test]
    fn no_org_context() {
        let user = user_from_claims(&json!({ "sub": "user_1", "username": "solo" })).unwrap();
        assert_eq!(user.username, "solo");
        assert!(user.organization.is_none());
        assert!(user.groups.is_empty());
    }

    #[test]
    fn subject_is_required() {
        assert!(user_from_claims(&json!({ "email": "x@y.z" })).is_err());
    }
}
