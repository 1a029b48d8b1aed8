//! GitHub Container Registry client.
//!
//! GHCR implements the distribution-spec v2 API for everything but
//! repository discovery: there is no `_catalog` endpoint, so
//! [`GhcrClient::list_repositories`] instead calls GitHub's REST API
//! (`GET /orgs/{org}/packages`) using the same PAT the transport layer
//! already authenticates registry calls with.

use std::ops::Range;

use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use super::{BlobStream, DistributionClient, RegistryClient};
use crate::config::RegistryConfig;
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::naming::UriRegistryType;
use crate::types::Manifest;

#[derive(Deserialize)]
struct GithubPackage {
    name: String,
}

/// Client for GitHub Container Registry.
pub struct GhcrClient {
    distribution: DistributionClient,
    client: reqwest::Client,
    org: Option<String>,
    token: Option<String>,
}

impl GhcrClient {
    /// Builds a client rooted at `base_url`. The org used for package
    /// listing is derived from `config.uri`'s first path segment
    /// (`ghcr.io/my-org` -> `my-org`).
    pub fn new(transport: ClientWithMiddleware, base_url: String, config: RegistryConfig) -> Self {
        let org = config
            .uri
            .split_once('/')
            .map(|(_, rest)| rest.split('/').next().unwrap_or("").to_string())
            .filter(|s| !s.is_empty());
        let token = config
            .password
            .clone()
            .or_else(|| std::env::var("GHCR_TOKEN").ok())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok());

        Self {
            distribution: DistributionClient::new(transport, base_url),
            client: reqwest::Client::new(),
            org,
            token,
        }
    }
}

#[async_trait::async_trait]
impl RegistryClient for GhcrClient {
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
        let org = self.org.as_deref().ok_or_else(|| {
            FreightlinerError::invalid_input("ghcr repository discovery requires an org in the registry uri")
        })?;
        let token = self.token.as_deref().ok_or_else(|| {
            FreightlinerError::unauthorized("ghcr repository discovery requires a github token")
        })?;

        let mut repositories = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "https://api.github.com/orgs/{org}/packages?package_type=container&per_page=100&page={page}"
            );
            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .header(reqwest::header::USER_AGENT, "freightliner")
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .send()
                .await
                .map_err(FreightlinerError::Http)?;
            if !response.status().is_success() {
                return Err(FreightlinerError::registry(
                    crate::error::RegistryErrorKind::Internal,
                    format!("github packages api returned {}", response.status()),
                ));
            }
            let packages: Vec<GithubPackage> = response.json().await.map_err(FreightlinerError::Http)?;
            if packages.is_empty() {
                break;
            }
            repositories.extend(packages.into_iter().map(|p| format!("{org}/{}", p.name)));
            page += 1;
        }
        Ok(repositories)
    }

    fn registry_type(&self) -> UriRegistryType {
        UriRegistryType::Ghcr
    }
}
