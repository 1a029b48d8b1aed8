//! Request and response bodies for the REST API.

use serde::{Deserialize, Serialize};

use crate::types::{CheckpointStats, CopyStatus, RepoRef};

/// Request body for `POST /api/v1/replicate`.
#[derive(Debug, Deserialize)]
pub struct ReplicateRequest {
    pub source: RepoRef,
    pub destination: RepoRef,
    #[serde(default)]
    pub include_tags: Vec<String>,
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// Response body for `POST /api/v1/replicate`: synchronous, so every
/// selected tag's outcome is available by the time the response returns.
#[derive(Debug, Serialize)]
pub struct ReplicateResponse {
    pub tags: Vec<TagResult>,
}

#[derive(Debug, Serialize)]
pub struct TagResult {
    pub tag: String,
    pub status: CopyStatus,
    pub skipped: bool,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

/// Request body for `POST /api/v1/replicate-tree`.
#[derive(Debug, Deserialize)]
pub struct ReplicateTreeRequest {
    pub source: RepoRef,
    pub destination: RepoRef,
    #[serde(default)]
    pub include_tags: Vec<String>,
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    #[serde(default)]
    pub exclude_repos: Vec<String>,
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// Response body for `POST /api/v1/replicate-tree`: the job is handed off
/// to a background task, so the caller polls `/api/v1/status/{job_id}`.
#[derive(Debug, Serialize)]
pub struct ReplicateTreeResponse {
    pub job_id: uuid::Uuid,
}

/// Response body for `GET /api/v1/status/{job_id}`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job_id: uuid::Uuid,
    pub phase: String,
    pub stats: Option<CheckpointStats>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Response body for `GET /metrics`. Plain JSON counters, not a
/// Prometheus exposition -- see the server module doc comment.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub requests_served: u64,
    pub bytes_transferred: u64,
    pub active_jobs: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
