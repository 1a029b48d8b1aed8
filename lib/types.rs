//! Shared data types that flow between the transport, auth, client, and
//! copy-engine layers.

use std::time::{Duration, SystemTime};

use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::{FreightlinerError, FreightlinerResult};

//--------------------------------------------------------------------------------------------------
// Manifest
//--------------------------------------------------------------------------------------------------

/// A single layer or config blob referenced by a [`Manifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LayerDescriptor {
    /// Content digest, `algo:hex`.
    digest: String,
    /// Size in bytes.
    size: u64,
    /// The blob's media type.
    media_type: String,
}

impl LayerDescriptor {
    /// Builds a new layer descriptor.
    pub fn new(digest: impl Into<String>, size: u64, media_type: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            size,
            media_type: media_type.into(),
        }
    }
}

/// A parsed OCI/Docker manifest. The byte content is canonical; `digest`
/// must equal `sha256(content)` on receipt (see [`Manifest::verify`]).
#[derive(Debug, Clone, Getters, Setters)]
#[getset(get = "pub with_prefix")]
pub struct Manifest {
    /// The raw manifest bytes, as received from the registry.
    content: Vec<u8>,
    /// The manifest's declared media type.
    media_type: String,
    /// The content digest of `content`.
    digest: String,
    /// The `schemaVersion` field.
    schema_version: u32,
    /// The config blob descriptor, if present.
    config_descriptor: Option<LayerDescriptor>,
    /// The manifest's layers, if present.
    layers: Option<Vec<LayerDescriptor>>,
}

impl Manifest {
    /// Builds a manifest from its raw bytes, computing the digest from
    /// `content` rather than trusting a caller-supplied one.
    pub fn from_content(
        content: Vec<u8>,
        media_type: impl Into<String>,
        schema_version: u32,
        config_descriptor: Option<LayerDescriptor>,
        layers: Option<Vec<LayerDescriptor>>,
    ) -> Self {
        let digest = sha256_digest(&content);
        Self {
            content,
            media_type: media_type.into(),
            digest,
            schema_version,
            config_descriptor,
            layers,
        }
    }

    /// Verifies the invariant `sha256(content) == digest`, returning an
    /// error if the manifest was corrupted or tampered with in transit.
    pub fn verify(&self) -> FreightlinerResult<()> {
        let computed = sha256_digest(&self.content);
        if computed != self.digest {
            return Err(FreightlinerError::invalid_input(format!(
                "manifest digest mismatch: expected {}, computed {computed}",
                self.digest
            )));
        }
        Ok(())
    }
}

/// Computes `sha256:<hex>` over `content`.
pub fn sha256_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

//--------------------------------------------------------------------------------------------------
// Auth
//--------------------------------------------------------------------------------------------------

/// Credentials produced by an [`crate::auth::Authenticator`] and consumed by
/// the transport layer to set the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// HTTP Basic auth with a plaintext username/password.
    Basic {
        /// The username.
        user: String,
        /// The password.
        pass: String,
    },
    /// A bearer token, used as-is in the `Authorization` header.
    BearerToken {
        /// The token value.
        token: String,
    },
    /// No credentials at all.
    Anonymous,
    /// HTTP Basic auth with an already-encoded `user:pass` base64 string.
    PreEncodedBasic {
        /// The base64-encoded `user:pass` string.
        b64: String,
    },
}

impl AuthConfig {
    /// Renders the value of the `Authorization` header for this credential,
    /// or `None` for [`AuthConfig::Anonymous`].
    pub fn to_header_value(&self) -> Option<String> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        match self {
            AuthConfig::Basic { user, pass } => {
                let encoded = STANDARD.encode(format!("{user}:{pass}"));
                Some(format!("Basic {encoded}"))
            }
            AuthConfig::BearerToken { token } => Some(format!("Bearer {token}")),
            AuthConfig::Anonymous => None,
            AuthConfig::PreEncodedBasic { b64 } => Some(format!("Basic {b64}")),
        }
    }
}

/// A cached token with an expiry, as produced by authenticators that back
/// onto a token-exchange protocol (ECR, ACR, GHCR PATs treated as static
/// tokens).
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The token value.
    pub token: String,
    /// When the token stops being usable.
    pub expires_at: SystemTime,
    /// An optional refresh token for exchanging a new access token.
    pub refresh_token: Option<String>,
}

impl CachedToken {
    /// A token with no expiry (never refreshed automatically).
    pub fn non_expiring(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: SystemTime::now() + Duration::from_secs(3600 * 24 * 365 * 10),
            refresh_token: None,
        }
    }

    /// A token is usable if there's still more than 5 minutes until expiry.
    pub fn is_usable(&self, now: SystemTime) -> bool {
        match self.expires_at.duration_since(now) {
            Ok(remaining) => remaining > Duration::from_secs(5 * 60),
            Err(_) => false,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Replication job / checkpoint
//--------------------------------------------------------------------------------------------------

/// A reference to a repository to replicate, as supplied in a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoRef {
    /// The registry name (as configured in [`crate::config::RegistriesConfig`]).
    pub registry: String,
    /// The repository path within that registry.
    pub repository: String,
}

/// A single replicate or replicate-tree request, and the unit the tree
/// orchestrator checkpoints progress against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationJob {
    /// Unique job identifier.
    pub id: uuid::Uuid,
    /// The source repository tree (or single repository).
    pub source: RepoRef,
    /// The destination repository tree (or single repository).
    pub destination: RepoRef,
    /// Glob patterns selecting which tags to include.
    pub include_tags: Vec<String>,
    /// Glob patterns excluding tags that would otherwise be included.
    pub exclude_tags: Vec<String>,
    /// Glob patterns excluding whole repositories from a tree replication.
    pub exclude_repos: Vec<String>,
    /// Number of concurrent per-repository workers (0 = auto-detect).
    pub workers: usize,
    /// Re-copy even when the destination digest already matches.
    pub force: bool,
    /// Plan the copy without performing writes.
    pub dry_run: bool,
    /// Whether progress should be checkpointed to disk.
    pub checkpoint_enabled: bool,
}

impl ReplicationJob {
    /// Builds a job with a freshly generated ID and permissive defaults
    /// (no filters, auto-detected worker count, checkpointing on).
    pub fn new(source: RepoRef, destination: RepoRef) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            source,
            destination,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            exclude_repos: Vec::new(),
            workers: 0,
            force: false,
            dry_run: false,
            checkpoint_enabled: true,
        }
    }
}

/// Status of a single tag within a [`RepoState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagState {
    /// The tag's status.
    pub status: CopyStatus,
    /// The source manifest digest, once known.
    pub source_digest: Option<String>,
    /// The destination manifest digest, once copied.
    pub dest_digest: Option<String>,
    /// The error message, if the tag failed.
    pub error: Option<String>,
}

impl TagState {
    /// A freshly enqueued, not-yet-started tag.
    pub fn pending() -> Self {
        Self {
            status: CopyStatus::Pending,
            source_digest: None,
            dest_digest: None,
            error: None,
        }
    }
}

/// Lifecycle status shared by repositories and tags within a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    /// Enqueued but not yet started.
    Pending,
    /// Currently being copied.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Per-repository state within a [`Checkpoint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoState {
    /// The repository's overall status.
    pub status: CopyStatus,
    /// Per-tag state.
    pub tags: std::collections::BTreeMap<String, TagState>,
    /// The repository-level error, if it failed outright (e.g. could not
    /// list tags).
    pub error: Option<String>,
}

impl RepoState {
    /// A freshly enqueued repository with no tag state yet.
    pub fn pending() -> Self {
        Self {
            status: CopyStatus::Pending,
            tags: std::collections::BTreeMap::new(),
            error: None,
        }
    }
}

/// Aggregate counters for a [`Checkpoint`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    /// Total repositories discovered.
    pub total: usize,
    /// Repositories that finished successfully.
    pub completed: usize,
    /// Repositories that finished with an error.
    pub failed: usize,
    /// Repositories currently being processed.
    pub in_progress: usize,
}

/// Durable, crash-resumable state for one tree replication run.
///
/// Invariant: after a crash, any repository left with `status == running`
/// is safe to re-execute, because tag copies are idempotent by digest
/// (see [`crate::copy`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The job this checkpoint tracks.
    pub job_id: uuid::Uuid,
    /// When the run started.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// When the checkpoint was last written.
    pub last_updated: chrono::DateTime<chrono::Utc>,
    /// Per-repository state, keyed by repository name.
    pub repositories: std::collections::BTreeMap<String, RepoState>,
    /// Aggregate counters.
    pub stats: CheckpointStats,
}

impl Checkpoint {
    /// Creates a fresh checkpoint for a newly started job.
    pub fn new(job_id: uuid::Uuid) -> Self {
        let now = chrono::Utc::now();
        Self {
            job_id,
            started_at: now,
            last_updated: now,
            repositories: std::collections::BTreeMap::new(),
            stats: CheckpointStats::default(),
        }
    }

    /// Recomputes [`CheckpointStats`] from the current `repositories` map.
    pub fn recompute_stats(&mut self) {
        let mut stats = CheckpointStats {
            total: self.repositories.len(),
            ..Default::default()
        };
        for repo in self.repositories.values() {
            match repo.status {
                CopyStatus::Completed => stats.completed += 1,
                CopyStatus::Failed => stats.failed += 1,
                CopyStatus::Running | CopyStatus::Pending => stats.in_progress += 1,
            }
        }
        self.stats = stats;
        self.last_updated = chrono::Utc::now();
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_digest_matches_content() {
        let manifest = Manifest::from_content(b"hello".to_vec(), "application/json", 2, None, None);
        assert!(manifest.verify().is_ok());
    }

    #[test]
    fn manifest_verify_detects_tamper() {
        let mut manifest =
            Manifest::from_content(b"hello".to_vec(), "application/json", 2, None, None);
        manifest.content = b"tampered".to_vec();
        assert!(manifest.verify().is_err());
    }

    #[test]
    fn basic_auth_header_is_base64_user_colon_pass() {
        let auth = AuthConfig::Basic {
            user: "AWS".into(),
            pass: "secret".into(),
        };
        let header = auth.to_header_value().unwrap();
        assert!(header.starts_with("Basic "));
    }

    #[test]
    fn anonymous_auth_has_no_header() {
        assert!(AuthConfig::Anonymous.to_header_value().is_none());
    }

    #[test]
    fn cached_token_usable_window() {
        let fresh = CachedToken {
            token: "t".into(),
            expires_at: SystemTime::now() + Duration::from_secs(600),
            refresh_token: None,
        };
        assert!(fresh.is_usable(SystemTime::now()));

        let stale = CachedToken {
            token: "t".into(),
            expires_at: SystemTime::now() + Duration::from_secs(60),
            refresh_token: None,
        };
        assert!(!stale.is_usable(SystemTime::now()));
    }

    #[test]
    fn checkpoint_recomputes_stats() {
        let mut checkpoint = Checkpoint::new(uuid::Uuid::new_v4());
        checkpoint
            .repositories
            .insert("a".into(), RepoState { status: CopyStatus::Completed, ..RepoState::pending() });
        checkpoint
            .repositories
            .insert("b".into(), RepoState { status: CopyStatus::Failed, ..RepoState::pending() });
        checkpoint
            .repositories
            .insert("c".into(), RepoState::pending());
        checkpoint.recompute_stats();
        assert_eq!(checkpoint.stats.total, 3);
        assert_eq!(checkpoint.stats.completed, 1);
        assert_eq!(checkpoint.stats.failed, 1);
        assert_eq!(checkpoint.stats.in_progress, 1);
    }
}
