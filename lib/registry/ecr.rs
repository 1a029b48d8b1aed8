//! Amazon ECR client.
//!
//! ECR has no `_catalog` endpoint; repository discovery goes through the
//! `AmazonEC2ContainerRegistry_V20150921.DescribeRepositories` control-plane
//! action, SigV4-signed the same way [`crate::auth::EcrAuthenticator`]
//! signs its token request.

use std::ops::Range;

use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use super::{BlobStream, DistributionClient, RegistryClient};
use crate::config::RegistryConfig;
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::naming::UriRegistryType;
use crate::types::Manifest;
use crate::util::sign_aws_v4;

#[derive(Deserialize)]
struct DescribeRepositoriesResponse {
    repositories: Vec<EcrRepository>,
    #[serde(rename = "nextToken")]
    next_token: Option<String>,
}

#[derive(Deserialize)]
struct EcrRepository {
    #[serde(rename = "repositoryName")]
    repository_name: String,
}

/// Client for Amazon Elastic Container Registry.
pub struct EcrClient {
    distribution: DistributionClient,
    client: reqwest::Client,
    region: String,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
}

impl EcrClient {
    /// Builds a client rooted at `base_url`, with credentials drawn from
    /// `config` the same way [`crate::auth::EcrAuthenticator`] resolves
    /// them.
    pub fn new(transport: ClientWithMiddleware, base_url: String, config: RegistryConfig) -> Self {
        Self {
            distribution: DistributionClient::new(transport, base_url),
            client: reqwest::Client::new(),
            region: config.region.unwrap_or_default(),
            access_key_id: config.aws_access_key_id.or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok()),
            secret_access_key: config
                .aws_secret_access_key
                .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok()),
            session_token: config.aws_session_token.or_else(|| std::env::var("AWS_SESSION_TOKEN").ok()),
        }
    }

    async fn describe_repositories_page(
        &self,
        next_token: Option<&str>,
    ) -> FreightlinerResult<DescribeRepositoriesResponse> {
        let access_key_id = self
            .access_key_id
            .as_deref()
            .ok_or_else(|| FreightlinerError::unauthorized("no AWS credentials configured for ecr registry"))?;
        let secret_access_key = self
            .secret_access_key
            .as_deref()
            .ok_or_else(|| FreightlinerError::unauthorized("no AWS credentials configured for ecr registry"))?;

        let host = format!("api.ecr.{}.amazonaws.com", self.region);
        let body = match next_token {
            Some(token) => serde_json::json!({ "maxResults": 1000, "nextToken": token }).to_string(),
            None => serde_json::json!({ "maxResults": 1000 }).to_string(),
        };
        let amz_date = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = chrono::Utc::now().format("%Y%m%d").to_string();

        let mut headers = vec![
            ("content-type".to_string(), "application/x-amz-json-1.1".to_string()),
            ("host".to_string(), host.clone()),
            (
                "x-amz-target".to_string(),
                "AmazonEC2ContainerRegistry_V20150921.DescribeRepositories".to_string(),
            ),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let authorization = sign_aws_v4(
            "POST",
            "/",
            access_key_id,
            secret_access_key,
            &self.region,
            "ecr",
            &date_stamp,
            &amz_date,
            &headers,
            &body,
        );

        let mut request = self
            .client
            .post(format!("https://{host}/"))
            .header("content-type", "application/x-amz-json-1.1")
            .header(
                "x-amz-target",
                "AmazonEC2ContainerRegistry_V20150921.DescribeRepositories",
            )
            .header("x-amz-date", &amz_date)
            .header("authorization", authorization)
            .body(body);
        if let Some(token) = &self.session_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request.send().await.map_err(FreightlinerError::Http)?;
        if !response.status().is_success() {
            return Err(FreightlinerError::registry(
                crate::error::RegistryErrorKind::Internal,
                format!("ecr DescribeRepositories failed with status {}", response.status()),
            ));
        }
        response.json().await.map_err(FreightlinerError::Http)
    }
}

#[async_trait::async_trait]
impl RegistryClient for EcrClient {
    async fn list_tags(&self, repository: &str) -> FreightlinerResult<Vec<String>> {
        self.distribution.list_tags(repository).await
    }

    async fn get_manifest(&self, repository: &str, reference: &str) -> FreightlinerResult<Manifest> {
        self.distribution.get_manifest(repository, reference).await
    }

    async fn put_manifest(&self, repository: &str, reference: &str, manifest: &Manifest) -> FreightlinerResult<()> {
        self.distribution.put_manifest(repository, reference, manifest).await
    }

    async fn blob_exists(&self, repository: &str, digest: &str) -> FreightlinerResult<bool> {
        self.distribution.blob_exists(repository, digest).await
    }

    async fn get_blob_stream(
        &self,
        repository: &str,
        digest: &str,
        range: Option<Range<u64>>,
    ) -> FreightlinerResult<BlobStream> {
        self.distribution.get_blob_stream(repository, digest, range).await
    }

    async fn put_blob_stream(
        &self,
        repository: &str,
        digest: &str,
        size: u64,
        stream: BlobStream,
    ) -> FreightlinerResult<()> {
        self.distribution.put_blob_stream(repository, digest, size, stream).await
    }

    async fn delete_tag(&self, repository: &str, reference: &str) -> FreightlinerResult<()> {
        self.distribution.delete_manifest(repository, reference).await
    }

    async fn list_repositories(&self) -> FreightlinerResult<Vec<String>> {
        let mut repositories = Vec::new();
        let mut next_token = None;
        loop {
            let page = self.describe_repositories_page(next_token.as_deref()).await?;
            repositories.extend(page.repositories.into_iter().map(|r| r.repository_name));
            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }
        Ok(repositories)
    }

    fn registry_type(&self) -> UriRegistryType {
        UriRegistryType::Ecr
    }
}
