//! Shared OCI distribution-spec v2 request plumbing, reused by every
//! provider client for the operations that don't vary across registries:
//! manifests, blobs, and tag listing.

use std::ops::Range;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use super::BlobStream;
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::types::{LayerDescriptor, Manifest};

const MANIFEST_ACCEPT: &str = concat!(
    "application/vnd.oci.image.manifest.v1+json, ",
    "application/vnd.oci.image.index.v1+json, ",
    "application/vnd.docker.distribution.manifest.v2+json, ",
    "application/vnd.docker.distribution.manifest.list.v2+json"
);

#[derive(Debug, Deserialize)]
struct TagsListResponse {
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(rename = "schemaVersion", default)]
    schema_version: u32,
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    config: Option<RawDescriptor>,
    layers: Option<Vec<RawDescriptor>>,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    digest: String,
    size: u64,
    #[serde(rename = "mediaType")]
    media_type: String,
}

/// The distribution-spec-v2 operations common to every registry flavour.
pub struct DistributionClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl DistributionClient {
    /// Builds a client for the distribution API rooted at `base_url`
    /// (scheme + host, no trailing slash, no `/v2` suffix).
    pub fn new(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn url(&self, repository: &str, suffix: &str) -> String {
        format!("{}/v2/{repository}/{suffix}", self.base_url)
    }

    async fn registry_error(response: reqwest::Response) -> FreightlinerError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let kind = match status {
            StatusCode::NOT_FOUND => crate::error::RegistryErrorKind::NotFound,
            StatusCode::UNAUTHORIZED => crate::error::RegistryErrorKind::Unauthorized,
            StatusCode::FORBIDDEN => crate::error::RegistryErrorKind::Forbidden,
            s if s.as_u16() == 429 || s.is_server_error() => crate::error::RegistryErrorKind::Unavailable,
            _ => crate::error::RegistryErrorKind::Internal,
        };
        FreightlinerError::registry(kind, format!("registry returned {status}: {body}"))
    }

    /// Lists every tag for `repository`, following `Link`-header pagination.
    pub async fn list_tags(&self, repository: &str) -> FreightlinerResult<Vec<String>> {
        let mut tags = Vec::new();
        let mut url = self.url(repository, "tags/list?n=1000");

        loop {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(FreightlinerError::HttpMiddleware)?;
            if !response.status().is_success() {
                return Err(Self::registry_error(response).await);
            }
            let next_link = next_page_link(response.headers());
            let parsed: TagsListResponse = response.json().await.map_err(FreightlinerError::Http)?;
            tags.extend(parsed.tags);

            match next_link {
                Some(next) => url = resolve_link(&self.base_url, &next),
                None => break,
            }
        }
        Ok(tags)
    }

    /// Fetches and verifies the manifest for `reference`.
    pub async fn get_manifest(&self, repository: &str, reference: &str) -> FreightlinerResult<Manifest> {
        let response = self
            .client
            .get(self.url(repository, &format!("manifests/{reference}")))
            .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(FreightlinerError::HttpMiddleware)?;
        if !response.status().is_success() {
            return Err(Self::registry_error(response).await);
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/vnd.oci.image.manifest.v1+json")
            .to_string();
        let content = response.bytes().await.map_err(FreightlinerError::Http)?.to_vec();

        let raw: RawManifest = serde_json::from_slice(&content)?;
        let manifest = Manifest::from_content(
            content,
            raw.media_type.unwrap_or(media_type),
            raw.schema_version,
            raw.config.map(|d| LayerDescriptor::new(d.digest, d.size, d.media_type)),
            raw.layers
                .map(|ls| ls.into_iter().map(|d| LayerDescriptor::new(d.digest, d.size, d.media_type)).collect()),
        );
        manifest.verify()?;
        Ok(manifest)
    }

    /// Uploads `manifest`, tagging it as `reference`.
    pub async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        manifest: &Manifest,
    ) -> FreightlinerResult<()> {
        let response = self
            .client
            .put(self.url(repository, &format!("manifests/{reference}")))
            .header(reqwest::header::CONTENT_TYPE, manifest.get_media_type())
            .body(manifest.get_content().clone())
            .send()
            .await
            .map_err(FreightlinerError::HttpMiddleware)?;
        if !response.status().is_success() {
            return Err(Self::registry_error(response).await);
        }
        Ok(())
    }

    /// Reports whether a blob with `digest` already exists in `repository`.
    pub async fn blob_exists(&self, repository: &str, digest: &str) -> FreightlinerResult<bool> {
        let response = self
            .client
            .head(self.url(repository, &format!("blobs/{digest}")))
            .send()
            .await
            .map_err(FreightlinerError::HttpMiddleware)?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::registry_error(response).await),
        }
    }

    /// Streams a blob, optionally resuming from `range.start` via an HTTP
    /// `Range` header.
    pub async fn get_blob_stream(
        &self,
        repository: &str,
        digest: &str,
        range: Option<Range<u64>>,
    ) -> FreightlinerResult<BlobStream> {
        let mut request = self.client.get(self.url(repository, &format!("blobs/{digest}")));
        if let Some(range) = &range {
            request = request.header(reqwest::header::RANGE, format!("bytes={}-{}", range.start, range.end.saturating_sub(1)));
        }
        let response = request.send().await.map_err(FreightlinerError::HttpMiddleware)?;
        if range.is_some() {
            if response.status() != StatusCode::PARTIAL_CONTENT && response.status() != StatusCode::OK {
                return Err(Self::registry_error(response).await);
            }
        } else if !response.status().is_success() {
            return Err(Self::registry_error(response).await);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FreightlinerError::Http));
        Ok(Box::pin(stream))
    }

    /// Uploads a blob of `size` bytes under `digest`, using the monolithic
    /// single-PUT upload flow (POST to start the upload session, PUT with
    /// `digest` to finalize).
    pub async fn put_blob_stream(
        &self,
        repository: &str,
        digest: &str,
        size: u64,
        stream: BlobStream,
    ) -> FreightlinerResult<()> {
        if self.blob_exists(repository, digest).await? {
            return Ok(());
        }

        let initiate = self
            .client
            .post(self.url(repository, "blobs/uploads/"))
            .send()
            .await
            .map_err(FreightlinerError::HttpMiddleware)?;
        if !initiate.status().is_success() {
            return Err(Self::registry_error(initiate).await);
        }
        let upload_location = initiate
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| FreightlinerError::registry(
                crate::error::RegistryErrorKind::Internal,
                "registry did not return an upload location",
            ))?
            .to_string();
        let upload_url = resolve_link(&self.base_url, &upload_location);
        let separator = if upload_url.contains('?') { '&' } else { '?' };
        let finalize_url = format!("{upload_url}{separator}digest={digest}");

        let body = reqwest::Body::wrap_stream(stream.map(|c| c.map_err(std::io::Error::other)));
        let response = self
            .client
            .put(finalize_url)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(FreightlinerError::HttpMiddleware)?;
        if !response.status().is_success() {
            return Err(Self::registry_error(response).await);
        }
        Ok(())
    }

    /// Deletes the manifest for `reference` via the standard distribution
    /// `DELETE /manifests/<reference>` endpoint. `reference` must already
    /// be a digest for registries that reject deletion by tag.
    pub async fn delete_manifest(&self, repository: &str, reference: &str) -> FreightlinerResult<()> {
        let response = self
            .client
            .delete(self.url(repository, &format!("manifests/{reference}")))
            .send()
            .await
            .map_err(FreightlinerError::HttpMiddleware)?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(Self::registry_error(response).await);
        }
        Ok(())
    }

    /// Lists repository names via the standard `_catalog` endpoint, for
    /// registries that support it.
    pub async fn list_catalog(&self) -> FreightlinerResult<Vec<String>> {
        #[derive(Deserialize)]
        struct CatalogResponse {
            repositories: Vec<String>,
        }

        let mut repos = Vec::new();
        let mut url = format!("{}/v2/_catalog?n=1000", self.base_url);
        loop {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(FreightlinerError::HttpMiddleware)?;
            if !response.status().is_success() {
                return Err(Self::registry_error(response).await);
            }
            let next_link = next_page_link(response.headers());
            let parsed: CatalogResponse = response.json().await.map_err(FreightlinerError::Http)?;
            repos.extend(parsed.repositories);
            match next_link {
                Some(next) => url = resolve_link(&self.base_url, &next),
                None => break,
            }
        }
        Ok(repos)
    }
}

/// Extracts the next-page URL from a distribution-spec `Link` header, e.g.
/// `</v2/_catalog?last=foo&n=100>; rel="next"`.
fn next_page_link(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    let (url_part, rel_part) = link.split_once(';')?;
    if !rel_part.contains("rel=\"next\"") {
        return None;
    }
    Some(url_part.trim().trim_start_matches('<').trim_end_matches('>').to_string())
}

fn resolve_link(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("{base_url}{link}")
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_page_link_parses_rel_next() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::LINK,
            "</v2/_catalog?last=foo&n=100>; rel=\"next\"".parse().unwrap(),
        );
        assert_eq!(
            next_page_link(&headers),
            Some("/v2/_catalog?last=foo&n=100".to_string())
        );
    }

    #[test]
    fn next_page_link_absent_without_header() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(next_page_link(&headers).is_none());
    }

    #[test]
    fn resolve_link_joins_relative_path() {
        assert_eq!(
            resolve_link("https://registry.example.com", "/v2/_catalog?last=a"),
            "https://registry.example.com/v2/_catalog?last=a"
        );
        assert_eq!(
            resolve_link("https://registry.example.com", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }
}
