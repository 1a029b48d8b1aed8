//! GitHub Container Registry authentication: a static personal access
//! token, resolved from config or the environment, used as HTTP Basic auth.
//!
//! GHCR does not issue short-lived tokens for this flow, so there is
//! nothing to cache or refresh -- the header is rebuilt from the resolved
//! token on every call, and [`Authenticator::invalidate`] is a no-op.

use reqwest::header::HeaderValue;

use super::Authenticator;
use crate::config::RegistryConfig;
use crate::error::{FreightlinerError, FreightlinerResult};

const DEFAULT_USERNAME: &str = "USERNAME";

/// Resolves a GitHub PAT for container registry operations.
pub struct GhcrAuthenticator {
    username: String,
    token: Option<String>,
}

impl GhcrAuthenticator {
    /// Builds an authenticator, resolving the token from config or one of
    /// `GHCR_TOKEN`, `GITHUB_TOKEN`, `GH_TOKEN`, in that order.
    pub fn from_config(config: &RegistryConfig) -> FreightlinerResult<Self> {
        let token = config
            .password
            .clone()
            .or_else(|| std::env::var("GHCR_TOKEN").ok())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(|| std::env::var("GH_TOKEN").ok());

        Ok(Self {
            username: config
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            token,
        })
    }
}

#[async_trait::async_trait]
impl Authenticator for GhcrAuthenticator {
    async fn auth_header(&self) -> FreightlinerResult<Option<HeaderValue>> {
        let Some(token) = &self.token else {
            return Ok(None);
        };
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let encoded = STANDARD.encode(format!("{}:{token}", self.username));
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|e| FreightlinerError::invalid_input(format!("invalid ghcr token: {e}")))?;
        Ok(Some(value))
    }

    async fn invalidate(&self) {}

    fn provider(&self) -> &'static str {
        "ghcr"
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
            registry_type: "ghcr".into(),
            uri: "ghcr.io/my-org".into(),
            region: None,
            account_id: None,
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
    async fn config_password_wins_over_env() {
        std::env::set_var("GITHUB_TOKEN", "env-token");
        let mut config = bare_config();
        config.password = Some("config-token".to_string());
        let auth = GhcrAuthenticator::from_config(&config).unwrap();
        assert_eq!(auth.token.as_deref(), Some("config-token"));
        std::env::remove_var("GITHUB_TOKEN");
    }

    #[tokio::test]
    async fn falls_back_to_github_token_env() {
        std::env::remove_var("GHCR_TOKEN");
        std::env::set_var("GITHUB_TOKEN", "env-token");
        let auth = GhcrAuthenticator::from_config(&bare_config()).unwrap();
        let header = auth.auth_header().await.unwrap().unwrap();
        assert!(header.to_str().unwrap().starts_with("Basic "));
        std::env::remove_var("GITHUB_TOKEN");
    }

    #[tokio::test]
    async fn no_token_is_anonymous() {
        std::env::remove_var("GHCR_TOKEN");
        std::env::remove_var("GITHUB_TOKEN");
        std::env::remove_var("GH_TOKEN");
        let auth = GhcrAuthenticator::from_config(&bare_config()).unwrap();
        assert!(auth.auth_header().await.unwrap().is_none());
    }
}
