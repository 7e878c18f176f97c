use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use super::jwks::JwksCache;
use super::{AuthError, AuthProvider, AuthUser, ProviderKind, TokenPair};
use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// AWS Cognito user pool, driven through the `InitiateAuth` JSON API
pub struct CognitoAuthClient {
    region: String,
    user_pool_id: String,
    client_id: String,
    client_secret: Option<String>,
    http: reqwest::Client,
    jwks: JwksCache,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    challenge_name: Option<String>,
    authentication_result: Option<AuthenticationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CognitoErrorBody {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(default, alias = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CognitoClaims {
    sub: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(rename = "cognito:username", default)]
    cognito_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(rename = "cognito:groups", default)]
    groups: Vec<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    token_use: String,
}

/// `SECRET_HASH` required by app clients that have a secret:
/// base64(HMAC-SHA256(client_secret, username + client_id))
pub fn secret_hash(client_secret: &str, username: &str, client_id: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| AuthError::Misconfigured(format!("invalid Cognito client secret: {}", e)))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

impl CognitoAuthClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, AuthError> {
        let user_pool_id = config
            .auth
            .cognito_user_pool_id
            .clone()
            .ok_or_else(|| AuthError::Misconfigured("COGNITO_USER_POOL_ID is not set".to_string()))?;
        let client_id = config
            .auth
            .cognito_client_id
            .clone()
            .ok_or_else(|| AuthError::Misconfigured("COGNITO_CLIENT_ID is not set".to_string()))?;
        let region = config.auth.aws_region.clone();

        let http = reqwest::Client::new();
        let jwks = JwksCache::new(format!("{}/.well-known/jwks.json", issuer(&region, &user_pool_id)), None, http.clone());
        Ok(Self {
            region,
            user_pool_id,
            client_id,
            client_secret: config.auth.cognito_client_secret.clone(),
            http,
            jwks,
        })
    }

    fn endpoint(&self) -> String {
        format!("https://cognito-idp.{}.amazonaws.com/", self.region)
    }

    async fn initiate_auth(&self, flow: &str, parameters: Value) -> Result<InitiateAuthResponse, AuthError> {
        let body = json!({
            "AuthFlow": flow,
            "ClientId": self.client_id,
            "AuthParameters": parameters,
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", "AWSCognitoIdentityProviderService.InitiateAuth")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|e| AuthError::Upstream(format!("unexpected Cognito response: {}", e)));
        }

        let error: CognitoErrorBody = serde_json::from_str(&text).unwrap_or(CognitoErrorBody {
            error_type: String::new(),
            message: text,
        });
        Err(map_cognito_error(&error.error_type, &error.message))
    }

    fn token_pair(result: InitiateAuthResponse, fallback_refresh: Option<&str>) -> Result<TokenPair, AuthError> {
        if let Some(challenge) = result.challenge_name {
            return Err(match challenge.as_str() {
                "NEW_PASSWORD_REQUIRED" => AuthError::PasswordChangeRequired,
                other => AuthError::Unsupported(format!("Authentication challenge {} is not supported", other)),
            });
        }
        let auth = result
            .authentication_result
            .ok_or_else(|| AuthError::Upstream("Cognito returned no authentication result".to_string()))?;
        let refresh = auth
            .refresh_token
            .or_else(|| fallback_refresh.map(str::to_string))
            .unwrap_or_default();
        Ok(TokenPair::bearer(auth.access_token, refresh, auth.expires_in))
    }
}

fn issuer(region: &str, user_pool_id: &str) -> String {
    format!("https://cognito-idp.{}.amazonaws.com/{}", region, user_pool_id)
}

fn map_cognito_error(error_type: &str, message: &str) -> AuthError {
    // __type may be prefixed with a namespace, e.g. "com.amazonaws...#NotAuthorizedException"
    let kind = error_type.rsplit('#').next().unwrap_or(error_type);
    match kind {
        "NotAuthorizedException" | "UserNotFoundException" => AuthError::InvalidCredentials,
        "PasswordResetRequiredException" => AuthError::PasswordChangeRequired,
        _ => AuthError::Upstream(format!("{}: {}", kind, message)),
    }
}

#[async_trait]
impl AuthProvider for CognitoAuthClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cognito
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let mut parameters = json!({ "USERNAME": username, "PASSWORD": password });
        if let Some(secret) = &self.client_secret {
            parameters["SECRET_HASH"] = json!(secret_hash(secret, username, &self.client_id)?);
        }

        let result = self.initiate_auth("USER_PASSWORD_AUTH", parameters).await?;
        let pair = Self::token_pair(result, None)?;
        tracing::info!("Cognito authentication succeeded for {}", username);
        Ok(pair)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let result = self
            .initiate_auth("REFRESH_TOKEN_AUTH", json!({ "REFRESH_TOKEN": refresh_token }))
            .await?;
        // Cognito does not rotate refresh tokens on this flow
        Self::token_pair(result, Some(refresh_token))
    }

    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.set_issuer(&[issuer(&self.region, &self.user_pool_id)]);

        let claims: CognitoClaims = self.jwks.verify(token, &validation).await?;
        if claims.token_use != "access" {
            return Err(AuthError::InvalidToken("expected an access token".to_string()));
        }
        let audience = claims.client_id.as_deref().or(claims.aud.as_deref());
        if audience != Some(self.client_id.as_str()) {
            return Err(AuthError::InvalidToken("token was not issued for this client".to_string()));
        }

        let username = claims
            .username
            .or(claims.cognito_username)
            .unwrap_or_else(|| claims.sub.clone());
        Ok(AuthUser {
            sub: claims.sub,
            username,
            email: claims.email,
            first_name: claims.given_name,
            last_name: claims.family_name,
            groups: claims.groups,
            organization: None,
            provider: ProviderKind::Cognito,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_matches_reference_value() {
        // base64(HMAC-SHA256("secret", "alice" + "client123"))
        let hash = secret_hash("secret", "alice", "client123").unwrap();
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"aliceclient123");
        assert_eq!(hash, STANDARD.encode(mac.finalize().into_bytes()));
        assert_eq!(hash.len(), 44);
    }

    #[test]
    fn maps_known_cognito_errors() {
        assert!(matches!(map_cognito_error("NotAuthorizedException", "bad"), AuthError::InvalidCredentials));
        assert!(matches!(
            map_cognito_error("com.amazonaws.cognito#UserNotFoundException", "nope"),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(map_cognito_error("TooManyRequestsException", "slow"), AuthError::Upstream(_)));
    }

    #[test]
    fn challenge_requires_password_change() {
        let response = InitiateAuthResponse {
            challenge_name: Some("NEW_PASSWORD_REQUIRED".to_string()),
            authentication_result: None,
        };
        assert!(matches!(
            CognitoAuthClient::token_pair(response, None),
            Err(AuthError::PasswordChangeRequired)
        ));
    }

    #[test]
    fn refresh_keeps_existing_refresh_token() {
        let response: InitiateAuthResponse = serde_json::from_value(json!({
            "AuthenticationResult": { "AccessToken": "a", "ExpiresIn": 3600, "TokenType": "Bearer" }
        }))
        .unwrap();
        let pair = CognitoAuthClient::token_pair(response, Some("r")).unwrap();
        assert_eq!(pair.refresh_token, "r");
        assert_eq!(pair.expires_in, 3600);
    }

    #[test]
    fn issuer_url() {
        assert_eq!(
            issuer("us-west-2", "us-west-2_AbC"),
            "https://cognito-idp.us-west-2.amazonaws.com/us-west-2_AbC"
        );
    }
}
