//! Amazon ECR authentication: a SigV4-signed call to
//! `AmazonEC2ContainerRegistry_V20150921.GetAuthorizationToken`, exchanged
//! for a short-lived Basic-auth token cached via [`TokenCache`].
//!
//! This hits the control-plane REST API directly with a hand-rolled SigV4
//! signature rather than pulling in an AWS SDK crate, to keep the
//! dependency stack aligned with the rest of the transport layer.

use reqwest::header::HeaderValue;

use super::cache::TokenCache;
use super::Authenticator;
use crate::config::RegistryConfig;
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::types::CachedToken;
use crate::util::sign_aws_v4;

/// Resolves and caches ECR authorization tokens for one account/region.
pub struct EcrAuthenticator {
    region: String,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
    cache: TokenCache,
    client: reqwest::Client,
}

impl EcrAuthenticator {
    /// Builds an authenticator from a registry's `ecr` configuration.
    ///
    /// ## Errors
    ///
    /// Returns [`FreightlinerError::invalid_input`] if `region` is absent
    /// (config validation should have already caught this).
    pub fn from_config(config: &RegistryConfig) -> FreightlinerResult<Self> {
        let region = config
            .region
            .clone()
            .ok_or_else(|| FreightlinerError::invalid_input("ecr registry requires region"))?;
        Ok(Self {
            region,
            access_key_id: config
                .aws_access_key_id
                .clone()
                .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok()),
            secret_access_key: config
                .aws_secret_access_key
                .clone()
                .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok()),
            session_token: config
                .aws_session_token
                .clone()
                .or_else(|| std::env::var("AWS_SESSION_TOKEN").ok()),
            cache: TokenCache::new(),
            client: reqwest::Client::new(),
        })
    }

    async fn fetch_token(&self) -> FreightlinerResult<CachedToken> {
        let access_key_id = self.access_key_id.as_deref().ok_or_else(|| {
            FreightlinerError::unauthorized("no AWS credentials configured for ecr registry")
        })?;
        let secret_access_key = self.secret_access_key.as_deref().ok_or_else(|| {
            FreightlinerError::unauthorized("no AWS credentials configured for ecr registry")
        })?;

        let host = format!("api.ecr.{}.amazonaws.com", self.region);
        let body = "{}";
        let amz_date = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = chrono::Utc::now().format("%Y%m%d").to_string();

        let mut headers = vec![
            ("content-type".to_string(), "application/x-amz-json-1.1".to_string()),
            ("host".to_string(), host.clone()),
            (
                "x-amz-target".to_string(),
                "AmazonEC2ContainerRegistry_V20150921.GetAuthorizationToken".to_string(),
            ),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let authorization = sign_request(
            access_key_id,
            secret_access_key,
            self.session_token.as_deref(),
            &self.region,
            &date_stamp,
            &amz_date,
            &headers,
            body,
        );

        let mut request = self
            .client
            .post(format!("https://{host}/"))
            .header("content-type", "application/x-amz-json-1.1")
            .header(
                "x-amz-target",
                "AmazonEC2ContainerRegistry_V20150921.GetAuthorizationToken",
            )
            .header("x-amz-date", &amz_date)
            .header("authorization", authorization)
            .body(body);
        if let Some(token) = &self.session_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request.send().await.map_err(FreightlinerError::Http)?;
        if !response.status().is_success() {
            return Err(FreightlinerError::unauthorized(format!(
                "ecr GetAuthorizationToken failed with status {}",
                response.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct AuthData {
            #[serde(rename = "authorizationToken")]
            authorization_token: String,
            #[serde(rename = "expiresAt")]
            expires_at: f64,
        }
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(rename = "authorizationData")]
            authorization_data: Vec<AuthData>,
        }

        let parsed: Response = response.json().await.map_err(FreightlinerError::Http)?;
        let entry = parsed.authorization_data.into_iter().next().ok_or_else(|| {
            FreightlinerError::unauthorized("ecr GetAuthorizationToken returned no credentials")
        })?;

        Ok(CachedToken {
            token: entry.authorization_token,
            expires_at: std::time::UNIX_EPOCH
                + std::time::Duration::from_secs_f64(entry.expires_at.max(0.0)),
            refresh_token: None,
        })
    }
}

#[async_trait::async_trait]
impl Authenticator for EcrAuthenticator {
    async fn auth_header(&self) -> FreightlinerResult<Option<HeaderValue>> {
        let token = self.cache.get_or_resolve(|| self.fetch_token()).await?;
        let value = HeaderValue::from_str(&format!("Basic {}", token.token))
            .map_err(|e| FreightlinerError::invalid_input(format!("invalid ecr token: {e}")))?;
        Ok(Some(value))
    }

    async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    fn provider(&self) -> &'static str {
        "ecr"
    }
}

#[allow(clippy::too_many_arguments)]
fn sign_request(
    access_key_id: &str,
    secret_access_key: &str,
    _session_token: Option<&str>,
    region: &str,
    date_stamp: &str,
    amz_date: &str,
    headers: &[(String, String)],
    body: &str,
) -> String {
    sign_aws_v4(
        "POST",
        "/",
        access_key_id,
        secret_access_key,
        region,
        "ecr",
        date_stamp,
        amz_date,
        headers,
        body,
    )
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigv4_signature_is_deterministic_for_fixed_inputs() {
        let headers = vec![
            ("content-type".to_string(), "application/x-amz-json-1.1".to_string()),
            ("host".to_string(), "api.ecr.us-west-2.amazonaws.com".to_string()),
            (
                "x-amz-target".to_string(),
                "AmazonEC2ContainerRegistry_V20150921.GetAuthorizationToken".to_string(),
            ),
            ("x-amz-date".to_string(), "20240101T000000Z".to_string()),
        ];
        let sig1 = sign_request(
            "AKIAEXAMPLE",
            "secret",
            None,
            "us-west-2",
            "20240101",
            "20240101T000000Z",
            &headers,
            "{}",
        );
        let sig2 = sign_request(
            "AKIAEXAMPLE",
            "secret",
            None,
            "us-west-2",
            "20240101",
            "20240101T000000Z",
            &headers,
            "{}",
        );
        assert_eq!(sig1, sig2);
        assert!(sig1.starts_with("AWS4-HMAC-SHA256 Credential=AKIAEXAMPLE/"));
    }

    #[test]
    fn missing_credentials_yield_unauthorized() {
        let config = RegistryConfig {
            registry_type: "ecr".into(),
            uri: "123.dkr.ecr.us-west-2.amazonaws.com".into(),
            region: Some("us-west-2".into()),
            account_id: Some("123".into()),
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
        };
        std::env::remove_var("AWS_ACCESS_KEY_ID");
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");
        let auth = EcrAuthenticator::from_config(&config).unwrap();
        assert!(auth.access_key_id.is_none());
    }
}
