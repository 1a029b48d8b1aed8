//! Azure Container Registry client.
//!
//! ACR implements the standard distribution-spec v2 `_catalog` and
//! manifest-delete endpoints directly, so this client is a thin
//! pass-through to [`DistributionClient`] that only differs from
//! [`super::GenericClient`] in its [`RegistryClient::registry_type`].

use std::ops::Range;

use reqwest_middleware::ClientWithMiddleware;

use super::{BlobStream, DistributionClient, RegistryClient};
use crate::error::FreightlinerResult;
use crate::naming::UriRegistryType;
use crate::types::Manifest;

/// Client for Azure Container Registry.
pub struct AcrClient {
    distribution: DistributionClient,
}

impl AcrClient {
    /// Builds a client rooted at `base_url`.
    pub fn new(client: ClientWithMiddleware, base_url: String) -> Self {
        Self {
            distribution: DistributionClient::new(client, base_url),
        }
    }
}

#[async_trait::async_trait]
impl RegistryClient for AcrClient {
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
        self.distribution.list_catalog().await
    }

    fn registry_type(&self) -> UriRegistryType {
        UriRegistryType::Acr
    }
}
