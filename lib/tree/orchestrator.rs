//! Bounded-concurrency tree replication: discovers source repositories,
//! fans work out to a fixed worker pool, and checkpoints progress so an
//! interrupted run resumes without redoing completed repositories.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::checkpoint_store::CheckpointStore;
use super::discovery::filter_names;
use crate::client::BaseClient;
use crate::copy::{copy_tag, CopyOptions};
use crate::error::{FreightlinerError, FreightlinerResult, RegistryErrorKind};
use crate::types::{Checkpoint, CopyStatus, RepoState, ReplicationJob, TagState};

/// Resolves the worker count for `requested`: `0` means auto-detect
/// (CPU count, minimum 2, leaving one core free once there are more
/// than 4).
pub fn resolve_worker_count(requested: usize) -> usize {
    if requested != 0 {
        return requested;
    }
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    if cpus > 4 {
        (cpus - 1).max(2)
    } else {
        cpus.max(2)
    }
}

/// Replicates every repository `job.source` exposes that survives the
/// include/exclude filters, to the corresponding path under
/// `job.destination`, using a pool of `resolve_worker_count(job.workers)`
/// concurrent per-repository workers.
///
/// Checkpointed to `checkpoint_dir` (if `job.checkpoint_enabled`) so a run
/// canceled via `cancellation` can resume from `resume` later. A per-repo
/// failure is recorded in the checkpoint and does not abort the run; only
/// discovery failures and cancellation return `Err`.
pub async fn replicate_tree(
    source_client: Arc<BaseClient>,
    dest_client: Arc<BaseClient>,
    job: ReplicationJob,
    checkpoint_dir: std::path::PathBuf,
    resume: Option<uuid::Uuid>,
    retry_failed: bool,
    cancellation: CancellationToken,
) -> FreightlinerResult<Checkpoint> {
    let store = Arc::new(CheckpointStore::new(checkpoint_dir));

    let mut checkpoint = match resume {
        Some(job_id) => store.load(job_id).await?,
        None => Checkpoint::new(job.id),
    };

    let source_registry = source_client.get_registry_client(&job.source.registry).await?;
    let repositories = source_registry.list_repositories().await?;
    let selected = filter_names(repositories, &[], &job.exclude_repos)?;

    for name in &selected {
        checkpoint.repositories.entry(name.clone()).or_insert_with(RepoState::pending);
    }
    checkpoint.recompute_stats();

    let worker_count = resolve_worker_count(job.workers);
    let (tx, rx) = mpsc::channel::<String>(selected.len().max(1));
    for name in &selected {
        let state = &checkpoint.repositories[name];
        let eligible = matches!(state.status, CopyStatus::Pending)
            || (retry_failed && matches!(state.status, CopyStatus::Failed));
        if eligible {
            tx.send(name.clone()).await.ok();
        }
    }
    drop(tx);

    let rx = Arc::new(Mutex::new(rx));
    let checkpoint = Arc::new(Mutex::new(checkpoint));

    let mut workers = tokio::task::JoinSet::new();
    for _ in 0..worker_count {
        let rx = rx.clone();
        let checkpoint = checkpoint.clone();
        let store = store.clone();
        let source_client = source_client.clone();
        let dest_client = dest_client.clone();
        let job = job.clone_for_worker();
        let cancellation = cancellation.clone();
        workers.spawn(async move {
            loop {
                let next = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(repo_name) = next else { break };
                if cancellation.is_cancelled() {
                    break;
                }
                run_one_repository(
                    &source_client,
                    &dest_client,
                    &job,
                    &repo_name,
                    &checkpoint,
                    &store,
                    &cancellation,
                )
                .await;
            }
        });
    }

    while let Some(result) = workers.join_next().await {
        result?;
    }

    let mut checkpoint = Arc::try_unwrap(checkpoint)
        .unwrap_or_else(|arc| panic!("checkpoint still shared after all workers joined: {:?}", Arc::strong_count(&arc)))
        .into_inner();
    checkpoint.recompute_stats();
    store.save(&checkpoint, true).await?;

    if cancellation.is_cancelled() {
        return Err(FreightlinerError::canceled("tree replication canceled"));
    }
    Ok(checkpoint)
}

async fn run_one_repository(
    source_client: &BaseClient,
    dest_client: &BaseClient,
    job: &ReplicationJob,
    repo_name: &str,
    checkpoint: &Mutex<Checkpoint>,
    store: &CheckpointStore,
    cancellation: &CancellationToken,
) {
    mark_running(checkpoint, repo_name).await;

    let dest_repo_name = translate_repo_name(&job.source.repository, &job.destination.repository, repo_name);
    let outcome = replicate_one_repository(
        source_client,
        dest_client,
        job,
        repo_name,
        &dest_repo_name,
        checkpoint,
        store,
        cancellation,
    )
    .await;

    let (status, error) = status_for_outcome(outcome);
    let mut guard = checkpoint.lock().await;
    let state = guard.repositories.entry(repo_name.to_string()).or_insert_with(RepoState::pending);
    state.status = status;
    state.error = error;
    guard.recompute_stats();
    let snapshot = guard.clone();
    drop(guard);
    let _ = store.save(&snapshot, false).await;
}

/// Maps a per-repository outcome to the checkpoint state it leaves behind.
///
/// A cancellation is distinguished from a genuine failure: it leaves the
/// repository `Pending` rather than `Failed`, so a plain `--resume
/// --skip-completed` re-processes it without requiring `--retry-failed`.
fn status_for_outcome(outcome: FreightlinerResult<()>) -> (CopyStatus, Option<String>) {
    match outcome {
        Ok(()) => (CopyStatus::Completed, None),
        Err(err) if err.is_kind(RegistryErrorKind::Canceled) => (CopyStatus::Pending, None),
        Err(err) => (CopyStatus::Failed, Some(err.render_chain())),
    }
}

async fn replicate_one_repository(
    source_client: &BaseClient,
    dest_client: &BaseClient,
    job: &ReplicationJob,
    repo_name: &str,
    dest_repo_name: &str,
    checkpoint: &Mutex<Checkpoint>,
    store: &CheckpointStore,
    cancellation: &CancellationToken,
) -> FreightlinerResult<()> {
    let source_repo = source_client.get_repository(&job.source.registry, repo_name).await?;
    let dest_repo = dest_client.get_repository(&job.destination.registry, dest_repo_name).await?;

    let tags = source_repo.list_tags().await?;
    let selected_tags = filter_names(tags, &job.include_tags, &job.exclude_tags)?;

    for tag in selected_tags {
        if cancellation.is_cancelled() {
            return Err(FreightlinerError::canceled("tree replication canceled"));
        }

        let options = CopyOptions { force: job.force, dry_run: job.dry_run };
        let result = copy_tag(&source_repo, &dest_repo, &tag, options).await;

        let mut guard = checkpoint.lock().await;
        let state = guard
            .repositories
            .entry(repo_name.to_string())
            .or_insert_with(RepoState::pending);
        let tag_state = state.tags.entry(tag.clone()).or_insert_with(TagState::pending);
        tag_state.status = result.status;
        tag_state.source_digest = result.source_digest;
        tag_state.dest_digest = result.dest_digest;
        tag_state.error = result.error.clone();
        guard.recompute_stats();
        let snapshot = guard.clone();
        drop(guard);
        store.save(&snapshot, false).await?;

        if result.status == CopyStatus::Failed {
            return Err(FreightlinerError::registry(
                crate::error::RegistryErrorKind::Internal,
                format!("tag '{tag}' failed: {}", result.error.unwrap_or_default()),
            ));
        }
    }
    Ok(())
}

async fn mark_running(checkpoint: &Mutex<Checkpoint>, repo_name: &str) {
    let mut guard = checkpoint.lock().await;
    let state = guard.repositories.entry(repo_name.to_string()).or_insert_with(RepoState::pending);
    state.status = CopyStatus::Running;
}

/// Rewrites a discovered source repository name to its destination-side
/// equivalent, by substituting the source tree's prefix for the
/// destination tree's prefix.
fn translate_repo_name(source_prefix: &str, dest_prefix: &str, repo_name: &str) -> String {
    match repo_name.strip_prefix(source_prefix) {
        Some(rest) => format!("{dest_prefix}{rest}"),
        None => format!("{dest_prefix}/{repo_name}"),
    }
}

impl ReplicationJob {
    fn clone_for_worker(&self) -> Self {
        self.clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_defaults_respect_minimum_and_headroom() {
        assert_eq!(resolve_worker_count(3), 3);
        assert!(resolve_worker_count(0) >= 2);
    }

    #[test]
    fn translate_repo_name_substitutes_prefix() {
        assert_eq!(translate_repo_name("proj", "mirror", "proj/app"), "mirror/app");
        assert_eq!(translate_repo_name("proj", "mirror", "other/app"), "mirror/other/app");
    }

    #[test]
    fn cancellation_leaves_a_repository_resume_eligible() {
        let (status, error) = status_for_outcome(Err(FreightlinerError::canceled("interrupted")));
        assert_eq!(status, CopyStatus::Pending);
        assert!(error.is_none());
    }

    #[test]
    fn genuine_failure_is_recorded_as_failed() {
        let (status, error) = status_for_outcome(Err(FreightlinerError::registry(
            RegistryErrorKind::Internal,
            "tag push failed",
        )));
        assert_eq!(status, CopyStatus::Failed);
        assert!(error.is_some());
    }

    #[test]
    fn success_is_recorded_as_completed() {
        let (status, error) = status_for_outcome(Ok(()));
        assert_eq!(status, CopyStatus::Completed);
        assert!(error.is_none());
    }
}
