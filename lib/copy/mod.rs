//! The copy engine: replicates one repository's tags from a source
//! [`BaseRepository`] to a destination one, idempotently by digest.

use crate::client::BaseRepository;
use crate::error::FreightlinerResult;
use crate::types::{CopyStatus, LayerDescriptor, Manifest};

/// Per-call knobs that don't belong on [`BaseRepository`] itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Re-copy even when the destination already has a manifest with the
    /// same digest under this tag.
    pub force: bool,
    /// Plan the copy (resolve digests, diff against the destination) but
    /// perform no writes.
    pub dry_run: bool,
}

/// The outcome of copying one tag.
#[derive(Debug, Clone)]
pub struct TagCopyResult {
    /// The tag that was copied.
    pub tag: String,
    /// The final status.
    pub status: CopyStatus,
    /// The source manifest digest.
    pub source_digest: Option<String>,
    /// The destination manifest digest after the copy (equal to
    /// `source_digest` on success).
    pub dest_digest: Option<String>,
    /// Set when the destination already had a matching digest and the
    /// copy was skipped entirely.
    pub skipped: bool,
    /// Bytes actually streamed from source to destination (blobs already
    /// present at the destination don't count).
    pub bytes_transferred: u64,
    /// The error, if `status` is [`CopyStatus::Failed`].
    pub error: Option<String>,
}

impl TagCopyResult {
    fn failed(tag: &str, source_digest: Option<String>, err: &crate::error::FreightlinerError) -> Self {
        Self {
            tag: tag.to_string(),
            status: CopyStatus::Failed,
            source_digest,
            dest_digest: None,
            skipped: false,
            bytes_transferred: 0,
            error: Some(err.render_chain()),
        }
    }
}

/// Copies `tag` from `source` to `dest`.
///
/// Idempotent: if `dest` already has a manifest under `tag` whose digest
/// matches the source's, the copy is skipped unless `options.force` is set.
/// Never returns `Err` for a failure that's specific to this tag -- those
/// are reported as [`CopyStatus::Failed`] in the result, so a tree
/// replication's per-tag failures don't abort the whole repository.
pub async fn copy_tag(
    source: &BaseRepository,
    dest: &BaseRepository,
    tag: &str,
    options: CopyOptions,
) -> TagCopyResult {
    let manifest = match source.get_tag(tag).await {
        Ok(manifest) => manifest,
        Err(err) => return TagCopyResult::failed(tag, None, &err),
    };
    let source_digest = manifest.get_digest().clone();

    if !options.force {
        match dest.get_tag(tag).await {
            Ok(existing) if existing.get_digest() == &source_digest => {
                return TagCopyResult {
                    tag: tag.to_string(),
                    status: CopyStatus::Completed,
                    source_digest: Some(source_digest.clone()),
                    dest_digest: Some(source_digest),
                    skipped: true,
                    bytes_transferred: 0,
                    error: None,
                };
            }
            _ => {}
        }
    }

    if options.dry_run {
        let bytes_transferred = match plan_bytes_to_transfer(source, dest, &manifest).await {
            Ok(bytes) => bytes,
            Err(err) => return TagCopyResult::failed(tag, Some(source_digest), &err),
        };
        return TagCopyResult {
            tag: tag.to_string(),
            status: CopyStatus::Pending,
            source_digest: Some(source_digest),
            dest_digest: None,
            skipped: false,
            bytes_transferred,
            error: None,
        };
    }

    match copy_blobs_and_manifest(source, dest, tag, &manifest).await {
        Ok(bytes_transferred) => TagCopyResult {
            tag: tag.to_string(),
            status: CopyStatus::Completed,
            source_digest: Some(source_digest.clone()),
            dest_digest: Some(source_digest),
            skipped: false,
            bytes_transferred,
            error: None,
        },
        Err(err) => TagCopyResult::failed(tag, Some(source_digest), &err),
    }
}

fn blob_descriptors(manifest: &Manifest) -> Vec<LayerDescriptor> {
    let mut descriptors: Vec<LayerDescriptor> = Vec::new();
    if let Some(config) = manifest.get_config_descriptor() {
        descriptors.push(config.clone());
    }
    if let Some(layers) = manifest.get_layers() {
        descriptors.extend(layers.iter().cloned());
    }
    descriptors
}

async fn copy_blobs_and_manifest(
    source: &BaseRepository,
    dest: &BaseRepository,
    tag: &str,
    manifest: &Manifest,
) -> FreightlinerResult<u64> {
    let mut bytes_transferred = 0u64;
    for descriptor in &blob_descriptors(manifest) {
        bytes_transferred += copy_blob_if_missing(source, dest, descriptor).await?;
    }

    dest.put_image(tag, manifest).await?;
    Ok(bytes_transferred)
}

/// Sums the size of every blob `manifest` references that isn't already
/// present at `dest`, without streaming or writing anything. Used by
/// `--dry-run` to report the byte total a real copy would transfer.
async fn plan_bytes_to_transfer(
    _source: &BaseRepository,
    dest: &BaseRepository,
    manifest: &Manifest,
) -> FreightlinerResult<u64> {
    let mut bytes_to_transfer = 0u64;
    for descriptor in &blob_descriptors(manifest) {
        let digest = descriptor.get_digest();
        if !dest.client().blob_exists(dest.repository(), digest).await? {
            bytes_to_transfer += *descriptor.get_size();
        }
    }
    Ok(bytes_to_transfer)
}

/// Copies one blob if the destination doesn't already have it, returning
/// the number of bytes actually streamed (0 if it was already present).
async fn copy_blob_if_missing(
    source: &BaseRepository,
    dest: &BaseRepository,
    descriptor: &LayerDescriptor,
) -> FreightlinerResult<u64> {
    let digest = descriptor.get_digest();
    if dest.client().blob_exists(dest.repository(), digest).await? {
        return Ok(0);
    }

    let stream = source
        .client()
        .get_blob_stream(source.repository(), digest, None)
        .await?;
    dest.client()
        .put_blob_stream(dest.repository(), digest, *descriptor.get_size(), stream)
        .await?;
    Ok(*descriptor.get_size())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::UriRegistryType;
    use crate::registry::{BlobStream, RegistryClient};
    use std::ops::Range;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct FakeRegistry {
        manifests: Mutex<std::collections::HashMap<String, Manifest>>,
        blobs: Mutex<std::collections::HashSet<String>>,
    }

    #[async_trait::async_trait]
    impl RegistryClient for FakeRegistry {
        async fn list_tags(&self, _repository: &str) -> FreightlinerResult<Vec<String>> {
            Ok(self.manifests.lock().await.keys().cloned().collect())
        }

        async fn get_manifest(&self, _repository: &str, reference: &str) -> FreightlinerResult<Manifest> {
            self.manifests
                .lock()
                .await
                .get(reference)
                .cloned()
                .ok_or_else(|| crate::error::FreightlinerError::not_found("no such tag"))
        }

        async fn put_manifest(&self, _repository: &str, reference: &str, manifest: &Manifest) -> FreightlinerResult<()> {
            self.manifests.lock().await.insert(reference.to_string(), manifest.clone());
            Ok(())
        }

        async fn blob_exists(&self, _repository: &str, digest: &str) -> FreightlinerResult<bool> {
            Ok(self.blobs.lock().await.contains(digest))
        }

        async fn get_blob_stream(
            &self,
            _repository: &str,
            _digest: &str,
            _range: Option<Range<u64>>,
        ) -> FreightlinerResult<BlobStream> {
            use futures::stream;
            Ok(Box::pin(stream::once(async { Ok(bytes::Bytes::from_static(b"data")) })))
        }

        async fn put_blob_stream(
            &self,
            _repository: &str,
            digest: &str,
            _size: u64,
            mut stream: BlobStream,
        ) -> FreightlinerResult<()> {
            use futures::StreamExt;
            while stream.next().await.is_some() {}
            self.blobs.lock().await.insert(digest.to_string());
            Ok(())
        }

        async fn delete_tag(&self, _repository: &str, reference: &str) -> FreightlinerResult<()> {
            self.manifests.lock().await.remove(reference);
            Ok(())
        }

        async fn list_repositories(&self) -> FreightlinerResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn registry_type(&self) -> UriRegistryType {
            UriRegistryType::Generic
        }
    }

    fn sample_manifest() -> Manifest {
        let layer = LayerDescriptor::new("sha256:layer1", 4, "application/octet-stream");
        Manifest::from_content(
            b"{\"schemaVersion\":2}".to_vec(),
            "application/vnd.oci.image.manifest.v1+json",
            2,
            None,
            Some(vec![layer]),
        )
    }

    #[tokio::test]
    async fn copies_manifest_and_missing_blobs() {
        let src_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new([("v1".to_string(), sample_manifest())].into_iter().collect()),
            blobs: Mutex::new(["sha256:layer1".to_string()].into_iter().collect()),
        });
        let dst_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new(Default::default()),
            blobs: Mutex::new(Default::default()),
        });

        let source = BaseRepository::new(src_registry, "app".to_string());
        let dest = BaseRepository::new(dst_registry.clone(), "app".to_string());

        let result = copy_tag(&source, &dest, "v1", CopyOptions::default()).await;
        assert_eq!(result.status, CopyStatus::Completed);
        assert!(!result.skipped);
        assert!(dst_registry.blobs.lock().await.contains("sha256:layer1"));
        assert!(dst_registry.manifests.lock().await.contains_key("v1"));
    }

    #[tokio::test]
    async fn skips_when_digest_already_matches() {
        let manifest = sample_manifest();
        let src_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new([("v1".to_string(), manifest.clone())].into_iter().collect()),
            blobs: Mutex::new(["sha256:layer1".to_string()].into_iter().collect()),
        });
        let dst_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new([("v1".to_string(), manifest)].into_iter().collect()),
            blobs: Mutex::new(["sha256:layer1".to_string()].into_iter().collect()),
        });

        let source = BaseRepository::new(src_registry, "app".to_string());
        let dest = BaseRepository::new(dst_registry, "app".to_string());

        let result = copy_tag(&source, &dest, "v1", CopyOptions::default()).await;
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn dry_run_performs_no_writes() {
        let src_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new([("v1".to_string(), sample_manifest())].into_iter().collect()),
            blobs: Mutex::new(["sha256:layer1".to_string()].into_iter().collect()),
        });
        let dst_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new(Default::default()),
            blobs: Mutex::new(Default::default()),
        });

        let source = BaseRepository::new(src_registry, "app".to_string());
        let dest = BaseRepository::new(dst_registry.clone(), "app".to_string());

        let result = copy_tag(
            &source,
            &dest,
            "v1",
            CopyOptions { force: false, dry_run: true },
        )
        .await;
        assert_eq!(result.status, CopyStatus::Pending);
        assert!(dst_registry.manifests.lock().await.is_empty());
        assert!(dst_registry.blobs.lock().await.is_empty());
        assert_eq!(result.bytes_transferred, 4);
    }

    #[tokio::test]
    async fn dry_run_reports_zero_bytes_when_blobs_already_present() {
        let manifest = sample_manifest();
        let src_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new([("v1".to_string(), manifest.clone())].into_iter().collect()),
            blobs: Mutex::new(["sha256:layer1".to_string()].into_iter().collect()),
        });
        let dst_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new(Default::default()),
            blobs: Mutex::new(["sha256:layer1".to_string()].into_iter().collect()),
        });

        let source = BaseRepository::new(src_registry, "app".to_string());
        let dest = BaseRepository::new(dst_registry, "app".to_string());

        let result = copy_tag(
            &source,
            &dest,
            "v1",
            CopyOptions { force: true, dry_run: true },
        )
        .await;
        assert_eq!(result.status, CopyStatus::Pending);
        assert_eq!(result.bytes_transferred, 0);
    }

    #[tokio::test]
    async fn missing_source_tag_fails_gracefully() {
        let src_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new(Default::default()),
            blobs: Mutex::new(Default::default()),
        });
        let dst_registry = Arc::new(FakeRegistry {
            manifests: Mutex::new(Default::default()),
            blobs: Mutex::new(Default::default()),
        });
        let source = BaseRepository::new(src_registry, "app".to_string());
        let dest = BaseRepository::new(dst_registry, "app".to_string());

        let result = copy_tag(&source, &dest, "missing", CopyOptions::default()).await;
        assert_eq!(result.status, CopyStatus::Failed);
        assert!(result.error.is_some());
    }
}
