//! A single repository's tag list and manifest cache, layered over one
//! [`SharedRegistryClient`].

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::FreightlinerResult;
use crate::registry::SharedRegistryClient;
use crate::types::Manifest;

/// Caches a repository's tag list and fetched manifests so a tree
/// replication's repeated lookups (plan, copy, verify) hit the network
/// once per tag rather than once per phase.
///
/// Invariant: [`BaseRepository::put_image`] and [`BaseRepository::delete_tag`]
/// both drop the cached tag list, since either one changes what
/// [`BaseRepository::list_tags`] would return.
pub struct BaseRepository {
    client: SharedRegistryClient,
    repository: String,
    tag_cache: RwLock<Option<Vec<String>>>,
    image_cache: RwLock<HashMap<String, Manifest>>,
}

impl BaseRepository {
    /// Builds a repository handle with empty caches.
    pub fn new(client: SharedRegistryClient, repository: String) -> Self {
        Self {
            client,
            repository,
            tag_cache: RwLock::new(None),
            image_cache: RwLock::new(HashMap::new()),
        }
    }

    /// The repository name this handle was built for.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Lists tags, serving from cache when populated.
    pub async fn list_tags(&self) -> FreightlinerResult<Vec<String>> {
        if let Some(tags) = self.tag_cache.read().await.as_ref() {
            return Ok(tags.clone());
        }
        let tags = self.client.list_tags(&self.repository).await?;
        *self.tag_cache.write().await = Some(tags.clone());
        Ok(tags)
    }

    /// Fetches the manifest for `reference`, serving from cache when
    /// present.
    pub async fn get_tag(&self, reference: &str) -> FreightlinerResult<Manifest> {
        if let Some(manifest) = self.image_cache.read().await.get(reference) {
            return Ok(manifest.clone());
        }
        let manifest = self.client.get_manifest(&self.repository, reference).await?;
        self.image_cache
            .write()
            .await
            .insert(reference.to_string(), manifest.clone());
        Ok(manifest)
    }

    /// Uploads `manifest` tagged as `reference`, updates the image cache,
    /// and invalidates the tag list (a new tag may now exist).
    pub async fn put_image(&self, reference: &str, manifest: &Manifest) -> FreightlinerResult<()> {
        self.client.put_manifest(&self.repository, reference, manifest).await?;
        self.image_cache
            .write()
            .await
            .insert(reference.to_string(), manifest.clone());
        *self.tag_cache.write().await = None;
        Ok(())
    }

    /// Deletes `reference`, evicts it from the image cache, and
    /// invalidates the tag list.
    pub async fn delete_tag(&self, reference: &str) -> FreightlinerResult<()> {
        self.client.delete_tag(&self.repository, reference).await?;
        self.image_cache.write().await.remove(reference);
        *self.tag_cache.write().await = None;
        Ok(())
    }

    /// Drops both caches, forcing the next call of either kind to hit the
    /// network.
    pub async fn clear_cache(&self) {
        *self.tag_cache.write().await = None;
        self.image_cache.write().await.clear();
    }

    /// Seeds the image cache with an already-known manifest, e.g. one the
    /// copy engine just fetched from the source side and wants the
    /// destination-side handle to remember after a successful push.
    pub async fn cache_image(&self, reference: &str, manifest: Manifest) {
        self.image_cache.write().await.insert(reference.to_string(), manifest);
    }

    /// Direct access to the underlying registry client, for operations
    /// (blob streaming) that don't go through the repository cache.
    pub fn client(&self) -> &SharedRegistryClient {
        &self.client
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
