use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::AuthError;

pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(12 * 60 * 60);

struct CachedKeys {
    fetched_at: Instant,
    keys: JwkSet,
}

/// Remote JSON Web Key Set with a time-based cache.
///
/// An unknown `kid` forces one refetch so rotated keys are picked up before the TTL expires.
pub struct JwksCache {
    url: String,
    bearer: Option<String>,
    ttl: Duration,
    http: reqwest::Client,
    cached: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    pub fn new(url: impl Into<String>, bearer: Option<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            bearer,
            ttl: DEFAULT_JWKS_TTL,
            http,
            cached: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Verify signature and registered claims of an RS256 token, returning its claims
    pub async fn verify<T: DeserializeOwned>(&self, token: &str, validation: &Validation) -> Result<T, AuthError> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header has no key id".to_string()))?;
        let key = self.decoding_key(&kid).await?;
        let data = decode::<T>(token, &key, validation)?;
        Ok(data.claims)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if is_fresh(entry.fetched_at, self.ttl, Instant::now()) {
                    if let Some(jwk) = entry.keys.find(kid) {
                        return Ok(DecodingKey::from_jwk(jwk)?);
                    }
                }
            }
        }

        let keys = self.fetch().await?;
        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| AuthError::InvalidToken(format!("signing key '{}' not found", kid)));

        *self.cached.write().await = Some(CachedKeys { fetched_at: Instant::now(), keys });
        key
    }

    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        let mut request = self.http.get(&self.url);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AuthError::Upstream(format!("JWKS fetch from {} returned {}", self.url, response.status())));
        }
        let keys = response.json::<JwkSet>().await?;
        tracing::debug!("Fetched {} signing keys from {}", keys.keys.len(), self.url);
        Ok(keys)
    }
}

fn is_fresh(fetched_at: Instant, ttl: Duration, now: Instant) -> bool {
    now.saturating_duration_since(fetched_at) < ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn freshness_window() {
        let start = Instant::now();
        assert!(is_fresh(start, DEFAULT_JWKS_TTL, start + Duration::from_secs(60)));
        assert!(!is_fresh(start, DEFAULT_JWKS_TTL, start + DEFAULT_JWKS_TTL));
    }

    #[test]
    fn finds_key_by_kid() {
        let set: JwkSet = serde_json::from_value(json!({
            "keys": [{
                "kty": "RSA",
                "kid": "k1",
                "alg": "RS256",
                "use": "sig",
                "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw",
                "e": "AQAB"
            }]
        }))
        .unwrap();
        assert!(set.find("k1").is_some());
        assert!(set.find("missing").is_none());
    }
}
