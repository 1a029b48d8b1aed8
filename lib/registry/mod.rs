//! Provider clients: one [`RegistryClient`] implementation per supported
//! registry flavour, all sharing the OCI distribution-spec v2 request
//! plumbing in [`distribution::DistributionClient`].

mod acr;
mod distribution;
mod ecr;
mod generic;
mod ghcr;
mod gcr;

pub use acr::AcrClient;
pub use distribution::DistributionClient;
pub use ecr::EcrClient;
pub use gcr::GcrClient;
pub use generic::GenericClient;
pub use ghcr::GhcrClient;

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::auth::SharedAuthenticator;
use crate::config::RegistryConfig;
use crate::error::FreightlinerResult;
use crate::naming::UriRegistryType;
use crate::types::Manifest;

/// A streamed blob body, as produced by [`RegistryClient::get_blob_stream`]
/// and consumed by [`RegistryClient::put_blob_stream`].
pub type BlobStream = BoxStream<'static, FreightlinerResult<Bytes>>;

/// The operations every provider client supports against one registry,
/// independent of its authentication and catalog-listing quirks.
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Lists all tags for `repository`.
    async fn list_tags(&self, repository: &str) -> FreightlinerResult<Vec<String>>;

    /// Fetches the manifest for `reference` (a tag or digest).
    async fn get_manifest(&self, repository: &str, reference: &str) -> FreightlinerResult<Manifest>;

    /// Uploads `manifest`, tagging it as `reference`.
    async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> FreightlinerResult<()>;

    /// Reports whether a blob with the given digest already exists in
    /// `repository`, without downloading it.
    async fn blob_exists(&self, repository: &str, digest: &str) -> FreightlinerResult<bool>;

    /// Streams a blob, optionally resuming from `range.start` for
    /// crash-resumable downloads.
    async fn get_blob_stream(
        &self,
        repository: &str,
        digest: &str,
        range: Option<Range<u64>>,
    ) -> FreightlinerResult<BlobStream>;

    /// Uploads a blob of `size` bytes from `stream`, under the content
    /// digest `digest`.
    async fn put_blob_stream(
        &self,
        repository: &str,
        digest: &str,
        size: u64,
        stream: BlobStream,
    ) -> FreightlinerResult<()>;

    /// Deletes the tag (or, for registries that only support digest
    /// deletion, the manifest it resolves to).
    async fn delete_tag(&self, repository: &str, reference: &str) -> FreightlinerResult<()>;

    /// Lists every repository this client's credentials can see, for tree
    /// replication's discovery phase.
    async fn list_repositories(&self) -> FreightlinerResult<Vec<String>>;

    /// The provider type this client was built for.
    fn registry_type(&self) -> UriRegistryType;
}

/// Shared handle to a provider client.
pub type SharedRegistryClient = Arc<dyn RegistryClient>;

/// Builds the provider client appropriate for `config`'s `registry_type`.
pub fn build_registry_client(
    config: &RegistryConfig,
    authenticator: SharedAuthenticator,
    call_timeout: Duration,
) -> FreightlinerResult<SharedRegistryClient> {
    let registry_type = crate::naming::classify_registry_type(&config.registry_type)?;
    let transport = crate::transport::build_client(authenticator, call_timeout, config.insecure_skip_verify);
    let base_url = format!("https://{}", config.uri.trim_end_matches('/'));

    let client: SharedRegistryClient = match registry_type {
        UriRegistryType::Ecr => Arc::new(EcrClient::new(transport, base_url, config.clone())),
        UriRegistryType::Gcr => Arc::new(GcrClient::new(transport, base_url)),
        UriRegistryType::Ghcr => Arc::new(GhcrClient::new(transport, base_url, config.clone())),
        UriRegistryType::Acr => Arc::new(AcrClient::new(transport, base_url)),
        UriRegistryType::Generic => Arc::new(GenericClient::new(transport, base_url)),
    };
    Ok(client)
}
