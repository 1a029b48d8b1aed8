//! HTTP request handlers for the REST API.
//!
//! Handlers coordinate with [`ServerState`]'s [`BaseClient`](crate::client::BaseClient)
//! and the [`crate::copy`]/[`crate::tree`] engines to perform the requested
//! operation, then translate the result into a JSON response.

use std::sync::atomic::Ordering;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tokio_util::sync::CancellationToken;

use super::state::{JobPhase, JobStatus, ServerState};
use super::types::{
    ErrorResponse, HealthResponse, MetricsResponse, ReplicateRequest, ReplicateResponse,
    ReplicateTreeRequest, ReplicateTreeResponse, StatusResponse, TagResult,
};
use crate::copy::{copy_tag, CopyOptions};
use crate::error::FreightlinerResult;
use crate::tree::{filter_names, replicate_tree};
use crate::types::{Checkpoint, CopyStatus, ReplicationJob};

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for `GET /health`.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let metrics = state.metrics();
    (
        StatusCode::OK,
        Json(MetricsResponse {
            requests_served: metrics.requests_served.load(Ordering::Relaxed),
            bytes_transferred: metrics.bytes_transferred.load(Ordering::Relaxed),
            active_jobs: metrics.active_jobs.load(Ordering::Relaxed),
        }),
    )
}

/// Handler for `POST /api/v1/replicate`. Runs synchronously: single-repo
/// copies are expected to finish within one HTTP request.
pub async fn replicate_handler(
    State(state): State<ServerState>,
    Json(req): Json<ReplicateRequest>,
) -> impl IntoResponse {
    state.record_request();
    match handle_replicate(&state, req).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse { error: err.render_chain() }),
        )
            .into_response(),
    }
}

async fn handle_replicate(state: &ServerState, req: ReplicateRequest) -> FreightlinerResult<ReplicateResponse> {
    let source = state.client().get_repository(&req.source.registry, &req.source.repository).await?;
    let dest = state
        .client()
        .get_repository(&req.destination.registry, &req.destination.repository)
        .await?;

    let tags = source.list_tags().await?;
    let selected = filter_names(tags, &req.include_tags, &req.exclude_tags)?;
    let options = CopyOptions { force: req.force, dry_run: req.dry_run };

    let mut results = Vec::with_capacity(selected.len());
    let mut total_bytes = 0u64;
    for tag in selected {
        let result = copy_tag(&source, &dest, &tag, options).await;
        total_bytes += result.bytes_transferred;
        results.push(TagResult {
            tag: result.tag,
            status: result.status,
            skipped: result.skipped,
            bytes_transferred: result.bytes_transferred,
            error: result.error,
        });
    }
    state.metrics().bytes_transferred.fetch_add(total_bytes, Ordering::Relaxed);
    Ok(ReplicateResponse { tags: results })
}

/// Handler for `POST /api/v1/replicate-tree`. Hands the run off to a
/// background task and returns `202 Accepted` immediately; poll
/// `GET /api/v1/status/{job_id}` for progress.
pub async fn replicate_tree_handler(
    State(state): State<ServerState>,
    Json(req): Json<ReplicateTreeRequest>,
) -> impl IntoResponse {
    state.record_request();

    let job = ReplicationJob {
        id: uuid::Uuid::new_v4(),
        source: req.source,
        destination: req.destination,
        include_tags: req.include_tags,
        exclude_tags: req.exclude_tags,
        exclude_repos: req.exclude_repos,
        workers: req.workers,
        force: req.force,
        dry_run: req.dry_run,
        checkpoint_enabled: true,
    };
    let job_id = job.id;

    state.jobs().write().await.insert(
        job_id,
        JobStatus { phase: JobPhase::Running, checkpoint: None, error: None },
    );
    state.metrics().active_jobs.fetch_add(1, Ordering::Relaxed);

    let client = state.client().clone();
    let checkpoint_dir = state.checkpoint_dir().clone();
    let jobs = state.jobs().clone();
    let metrics = state.metrics().clone();
    tokio::spawn(async move {
        let cancellation = CancellationToken::new();
        let outcome = replicate_tree(client.clone(), client, job, checkpoint_dir, None, false, cancellation).await;

        let mut guard = jobs.write().await;
        let entry = guard
            .entry(job_id)
            .or_insert_with(|| JobStatus { phase: JobPhase::Running, checkpoint: None, error: None });
        match outcome {
            Ok(checkpoint) => {
                entry.phase = if checkpoint.stats.failed > 0 { JobPhase::Failed } else { JobPhase::Completed };
                entry.checkpoint = Some(checkpoint);
            }
            Err(err) => {
                entry.phase = if err.is_kind(crate::error::RegistryErrorKind::Canceled) {
                    JobPhase::Canceled
                } else {
                    JobPhase::Failed
                };
                entry.error = Some(err.render_chain());
            }
        }
        metrics.active_jobs.fetch_sub(1, Ordering::Relaxed);
    });

    (StatusCode::ACCEPTED, Json(ReplicateTreeResponse { job_id }))
}

/// Handler for `GET /api/v1/status/{job_id}`. Checks the in-memory job
/// table first (current-process jobs), falling back to the checkpoint
/// store for jobs started by a previous process, then `404`.
pub async fn status_handler(State(state): State<ServerState>, Path(job_id): Path<uuid::Uuid>) -> impl IntoResponse {
    state.record_request();

    if let Some(status) = state.jobs().read().await.get(&job_id) {
        return (
            StatusCode::OK,
            Json(StatusResponse {
                job_id,
                phase: phase_name(status.phase).to_string(),
                stats: status.checkpoint.as_ref().map(|c| c.stats),
                error: status.error.clone(),
            }),
        )
            .into_response();
    }

    match state.checkpoint_store().show(job_id).await {
        Ok(checkpoint) => (
            StatusCode::OK,
            Json(StatusResponse {
                job_id,
                phase: phase_from_checkpoint(&checkpoint).to_string(),
                stats: Some(checkpoint.stats),
                error: None,
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: err.render_chain() }),
        )
            .into_response(),
    }
}

fn phase_name(phase: JobPhase) -> &'static str {
    match phase {
        JobPhase::Running => "running",
        JobPhase::Completed => "completed",
        JobPhase::Failed => "failed",
        JobPhase::Canceled => "canceled",
    }
}

/// A checkpoint loaded from disk carries no phase of its own -- derive one
/// from its aggregate stats.
fn phase_from_checkpoint(checkpoint: &Checkpoint) -> &'static str {
    if checkpoint.stats.in_progress > 0 {
        "running"
    } else if checkpoint.stats.failed > 0 {
        "failed"
    } else if checkpoint
        .repositories
        .values()
        .any(|r| r.tags.values().any(|t| t.status == CopyStatus::Failed))
    {
        "failed"
    } else {
        "completed"
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_from_checkpoint_prefers_in_progress() {
        let mut checkpoint = Checkpoint::new(uuid::Uuid::new_v4());
        checkpoint.stats.in_progress = 1;
        checkpoint.stats.failed = 1;
        assert_eq!(phase_from_checkpoint(&checkpoint), "running");
    }

    #[test]
    fn phase_from_checkpoint_reports_failed() {
        let mut checkpoint = Checkpoint::new(uuid::Uuid::new_v4());
        checkpoint.stats.failed = 1;
        assert_eq!(phase_from_checkpoint(&checkpoint), "failed");
    }

    #[test]
    fn phase_from_checkpoint_reports_completed() {
        let mut checkpoint = Checkpoint::new(uuid::Uuid::new_v4());
        checkpoint.stats.completed = 3;
        assert_eq!(phase_from_checkpoint(&checkpoint), "completed");
    }
}
