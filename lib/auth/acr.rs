//! Azure Container Registry authentication: exchanges an Azure AD
//! service-principal token for an ACR refresh token, then uses that
//! refresh token as a Bearer credential.
//!
//! Like ECR, this talks to the control-plane REST endpoints directly
//! (`login.microsoftonline.com`, then the registry's own `/oauth2/exchange`)
//! instead of depending on an Azure SDK crate.

use reqwest::header::HeaderValue;
use serde::Deserialize;

use super::cache::TokenCache;
use super::Authenticator;
use crate::config::RegistryConfig;
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::types::CachedToken;

#[derive(Deserialize)]
struct AadTokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: String,
}

fn default_expires_in() -> String {
    "3600".to_string()
}

#[derive(Deserialize)]
struct ExchangeResponse {
    refresh_token: String,
}

/// Resolves and caches an ACR refresh token for one registry.
pub struct AcrAuthenticator {
    registry_host: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    cache: TokenCache,
    client: reqwest::Client,
}

impl AcrAuthenticator {
    /// Builds an authenticator. Service-principal credentials are optional:
    /// without them, pulls fall through as anonymous (valid for registries
    /// with anonymous pull enabled).
    pub fn from_config(config: &RegistryConfig) -> FreightlinerResult<Self> {
        let registry_host = config
            .account_id
            .clone()
            .map(|name| format!("{name}.azurecr.io"))
            .unwrap_or_else(|| config.uri.clone());

        Ok(Self {
            registry_host,
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            cache: TokenCache::new(),
            client: reqwest::Client::new(),
        })
    }

    async fn fetch_token(&self) -> FreightlinerResult<CachedToken> {
        let (tenant_id, client_id, client_secret) = match (
            &self.tenant_id,
            &self.client_id,
            &self.client_secret,
        ) {
            (Some(t), Some(c), Some(s)) => (t, c, s),
            _ => {
                return Err(FreightlinerError::unauthorized(
                    "no azure service-principal credentials configured for acr registry",
                ))
            }
        };

        let aad_url = format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token");
        let aad_response = self
            .client
            .post(&aad_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", "https://management.azure.com/.default"),
            ])
            .send()
            .await
            .map_err(FreightlinerError::Http)?;

        if !aad_response.status().is_success() {
            return Err(FreightlinerError::unauthorized(format!(
                "azure ad token request failed with status {}",
                aad_response.status()
            )));
        }
        let aad_token: AadTokenResponse = aad_response.json().await.map_err(FreightlinerError::Http)?;

        let exchange_url = format!("https://{}/oauth2/exchange", self.registry_host);
        let exchange_response = self
            .client
            .post(&exchange_url)
            .form(&[
                ("grant_type", "access_token"),
                ("service", self.registry_host.as_str()),
                ("tenant", tenant_id.as_str()),
                ("access_token", aad_token.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(FreightlinerError::Http)?;

        if !exchange_response.status().is_success() {
            return Err(FreightlinerError::unauthorized(format!(
                "acr oauth2/exchange failed with status {}",
                exchange_response.status()
            )));
        }
        let exchanged: ExchangeResponse = exchange_response.json().await.map_err(FreightlinerError::Http)?;

        let expires_in: u64 = aad_token.expires_in.parse().unwrap_or(3600);
        Ok(CachedToken {
            token: exchanged.refresh_token,
            expires_at: std::time::SystemTime::now() + std::time::Duration::from_secs(expires_in),
            refresh_token: None,
        })
    }
}

#[async_trait::async_trait]
impl Authenticator for AcrAuthenticator {
    async fn auth_header(&self) -> FreightlinerResult<Option<HeaderValue>> {
        if self.tenant_id.is_none() {
            return Ok(None);
        }
        let token = self.cache.get_or_resolve(|| self.fetch_token()).await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token.token))
            .map_err(|e| FreightlinerError::invalid_input(format!("invalid acr token: {e}")))?;
        Ok(Some(value))
    }

    async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    fn provider(&self) -> &'static str {
        "acr"
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
            registry_type: "acr".into(),
            uri: "myregistry.azurecr.io".into(),
            region: None,
            account_id: Some("myregistry".into()),
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

    #[test]
    fn registry_host_derived_from_account_id() {
        let auth = AcrAuthenticator::from_config(&bare_config()).unwrap();
        assert_eq!(auth.registry_host, "myregistry.azurecr.io");
    }

    #[tokio::test]
    async fn no_service_principal_is_anonymous() {
        let auth = AcrAuthenticator::from_config(&bare_config()).unwrap();
        assert!(auth.auth_header().await.unwrap().is_none());
    }
}
