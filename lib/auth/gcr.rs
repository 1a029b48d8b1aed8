//! Google Container/Artifact Registry authentication: signs a JWT with a
//! service-account key and exchanges it for an OAuth2 access token.
//!
//! When no service-account key is configured, requests go out unauthenticated
//! -- GCR serves public repositories to anonymous pulls, so the absence of a
//! credential is not itself an error.

use std::time::{Duration, SystemTime};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

use super::cache::TokenCache;
use super::Authenticator;
use crate::config::RegistryConfig;
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::types::CachedToken;

const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Resolves and caches a GCP OAuth2 access token for registry pulls/pushes.
pub struct GcrAuthenticator {
    key: Option<ServiceAccountKey>,
    cache: TokenCache,
    client: reqwest::Client,
}

impl GcrAuthenticator {
    /// Builds an authenticator, loading the service-account key from
    /// `config.service_account_key_path` or `GOOGLE_APPLICATION_CREDENTIALS`
    /// if present. Neither being set is not an error: the authenticator
    /// falls back to anonymous access.
    pub fn from_config(config: &RegistryConfig) -> FreightlinerResult<Self> {
        let key_path = config
            .service_account_key_path
            .clone()
            .or_else(|| std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok());

        let key = match key_path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(FreightlinerError::Io)?;
                Some(serde_json::from_str(&content).map_err(FreightlinerError::Json)?)
            }
            None => None,
        };

        Ok(Self {
            key,
            cache: TokenCache::new(),
            client: reqwest::Client::new(),
        })
    }

    async fn fetch_token(&self, key: &ServiceAccountKey) -> FreightlinerResult<CachedToken> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("system clock is after the unix epoch")
            .as_secs() as i64;
        let claims = Claims {
            iss: key.client_email.clone(),
            scope: SCOPE.to_string(),
            aud: key.token_uri.clone(),
            exp: now + 3600,
            iat: now,
        };
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| FreightlinerError::invalid_input(format!("invalid gcr private key: {e}")))?;
        let jwt = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| FreightlinerError::invalid_input(format!("failed to sign gcr jwt: {e}")))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(FreightlinerError::Http)?;

        if !response.status().is_success() {
            return Err(FreightlinerError::unauthorized(format!(
                "gcr token exchange failed with status {}",
                response.status()
            )));
        }

        let parsed: TokenResponse = response.json().await.map_err(FreightlinerError::Http)?;
        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(parsed.expires_in),
            refresh_token: None,
        })
    }
}

#[async_trait::async_trait]
impl Authenticator for GcrAuthenticator {
    async fn auth_header(&self) -> FreightlinerResult<Option<HeaderValue>> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let token = self.cache.get_or_resolve(|| self.fetch_token(key)).await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token.token))
            .map_err(|e| FreightlinerError::invalid_input(format!("invalid gcr token: {e}")))?;
        Ok(Some(value))
    }

    async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    fn provider(&self) -> &'static str {
        "gcr"
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> RegistryConfig {
        RegistryConfig {
            registry_type: "gcr".into(),
            uri: "gcr.io/my-project".into(),
            region: None,
            account_id: Some("my-project".into()),
            auth_type: None,
            username: None,
            password: None,
            service_account_key_path: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_session_token: None,
            insecure_skip_verify: false,
            call_timeout: None,
        }
    }

    #[tokio::test]
    async fn no_key_means_anonymous_header() {
        std::env::remove_var("GOOGLE_APPLICATION_CREDENTIALS");
        let auth = GcrAuthenticator::from_config(&bare_config()).unwrap();
        assert!(auth.auth_header().await.unwrap().is_none());
    }
}
