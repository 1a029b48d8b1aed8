//! Google Container/Artifact Registry client.
//!
//! GCR has no registry-wide `_catalog` endpoint; it extends the
//! distribution-spec tags-list response with a `child` field listing
//! immediate sub-repositories, which [`GcrClient::list_repositories`] walks
//! recursively from the registry root.

use std::ops::Range;

use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use super::{BlobStream, DistributionClient, RegistryClient};
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::naming::UriRegistryType;
use crate::types::Manifest;

#[derive(Deserialize)]
struct GcrTagsResponse {
    #[serde(default)]
    child: Vec<String>,
}

/// Client for Google Container Registry / Artifact Registry.
pub struct GcrClient {
    distribution: DistributionClient,
    client: ClientWithMiddleware,
    base_url: String,
}

impl GcrClient {
    /// Builds a client rooted at `base_url`.
    pub fn new(client: ClientWithMiddleware, base_url: String) -> Self {
        Self {
            distribution: DistributionClient::new(client.clone(), base_url.clone()),
            client,
            base_url,
        }
    }

    async fn list_children(&self, path: &str) -> FreightlinerResult<Vec<String>> {
        let url = format!("{}/v2/{path}/tags/list", self.base_url);
        let response = self.client.get(&url).send().await.map_err(FreightlinerError::HttpMiddleware)?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let parsed: GcrTagsResponse = response.json().await.map_err(FreightlinerError::Http)?;
        Ok(parsed.child)
    }
}

#[async_trait::async_trait]
impl RegistryClient for GcrClient {
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
        // Breadth-first walk from the registry root, following `child`
        // listings rather than a flat catalog.
        let mut repositories = Vec::new();
        let mut frontier = vec![String::new()];
        let mut seen = std::collections::HashSet::new();

        while let Some(path) = frontier.pop() {
            let children = self.list_children(path.trim_start_matches('/')).await?;
            for child in children {
                let full_path = if path.is_empty() {
                    child.clone()
                } else {
                    format!("{path}/{child}")
                };
                if !seen.insert(full_path.clone()) {
                    continue;
                }
                if !self.distribution.list_tags(&full_path).await.unwrap_or_default().is_empty() {
                    repositories.push(full_path.clone());
                }
                frontier.push(full_path);
            }
        }
        Ok(repositories)
    }

    fn registry_type(&self) -> UriRegistryType {
        UriRegistryType::Gcr
    }
}
