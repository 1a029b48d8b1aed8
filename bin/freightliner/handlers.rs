use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use freightliner::client::BaseClient;
use freightliner::cli::CheckpointAction;
use freightliner::config::{load_config, load_from_env, resolve_config_path, RegistriesConfig};
use freightliner::copy::{copy_tag, CopyOptions};
use freightliner::error::{FreightlinerError, FreightlinerResult};
use freightliner::naming::parse_registry_path;
use freightliner::server::{create_router, ServerState};
use freightliner::tree::{filter_names, replicate_tree, resolve_worker_count, CheckpointStore};
use freightliner::types::{CopyStatus, RepoRef, ReplicationJob};

//--------------------------------------------------------------------------------------------------
// Functions: Config loading
//--------------------------------------------------------------------------------------------------

/// Loads the registries configuration: the resolved config path if it
/// exists on disk, falling back to the legacy flat-environment-variable
/// form, and erroring if neither yields anything usable.
async fn load_registries(cli_flag: Option<PathBuf>) -> FreightlinerResult<RegistriesConfig> {
    let path = resolve_config_path(cli_flag);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return load_config(&path.to_string_lossy()).await;
    }
    load_from_env().ok_or_else(|| {
        FreightlinerError::ConfigInvalid(format!(
            "no registries configuration found at {} and no FREIGHTLINER_REGISTRY_* environment variables set",
            path.display()
        ))
    })
}

fn client_from(registries: RegistriesConfig) -> Arc<BaseClient> {
    let call_timeout = registries.defaults.call_timeout;
    Arc::new(BaseClient::new(registries, call_timeout))
}

fn split_path(s: &str) -> FreightlinerResult<RepoRef> {
    let path = parse_registry_path(s)?;
    Ok(RepoRef { registry: path.host, repository: path.repository })
}

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

pub async fn replicate_subcommand(
    config: Option<PathBuf>,
    source: String,
    destination: String,
    include_tag: Vec<String>,
    exclude_tag: Vec<String>,
    force: bool,
    dry_run: bool,
) -> FreightlinerResult<()> {
    let registries = load_registries(config).await?;
    let client = client_from(registries);

    let source_ref = split_path(&source)?;
    let dest_ref = split_path(&destination)?;
    let source_repo = client.get_repository(&source_ref.registry, &source_ref.repository).await?;
    let dest_repo = client.get_repository(&dest_ref.registry, &dest_ref.repository).await?;

    let tags = source_repo.list_tags().await?;
    let selected = filter_names(tags, &include_tag, &exclude_tag)?;
    if selected.is_empty() {
        tracing::warn!("no tags matched the include/exclude filters");
    }

    let options = CopyOptions { force, dry_run };
    let mut failures = 0usize;
    for tag in &selected {
        let result = copy_tag(&source_repo, &dest_repo, tag, options).await;
        match result.status {
            CopyStatus::Completed if result.skipped => {
                println!("{tag}: skipped (digest unchanged)");
            }
            CopyStatus::Completed => {
                println!("{tag}: copied ({} bytes)", result.bytes_transferred);
            }
            CopyStatus::Pending => {
                println!("{tag}: would copy (dry run)");
            }
            CopyStatus::Failed => {
                failures += 1;
                eprintln!("{tag}: failed: {}", result.error.unwrap_or_default());
            }
            CopyStatus::Running => unreachable!("copy_tag always returns a terminal status"),
        }
    }

    if failures > 0 {
        return Err(FreightlinerError::registry(
            freightliner::error::RegistryErrorKind::Internal,
            format!("{failures} of {} tags failed to copy", selected.len()),
        ));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn replicate_tree_subcommand(
    config: Option<PathBuf>,
    source: String,
    destination: String,
    workers: usize,
    exclude_repo: Vec<String>,
    include_tag: Vec<String>,
    exclude_tag: Vec<String>,
    dry_run: bool,
    force: bool,
    checkpoint: bool,
    checkpoint_dir: Option<PathBuf>,
    resume: Option<uuid::Uuid>,
    retry_failed: bool,
) -> FreightlinerResult<()> {
    let registries = load_registries(config).await?;
    let checkpoint_dir = checkpoint_dir.unwrap_or_else(|| PathBuf::from(&registries.defaults.checkpoint_dir));
    let client = client_from(registries);

    let source_ref = split_path(&source)?;
    let dest_ref = split_path(&destination)?;

    let mut job = ReplicationJob::new(source_ref, dest_ref);
    job.workers = resolve_worker_count(workers);
    job.exclude_repos = exclude_repo;
    job.include_tags = include_tag;
    job.exclude_tags = exclude_tag;
    job.dry_run = dry_run;
    job.force = force;
    job.checkpoint_enabled = checkpoint;

    let cancellation = tokio_util::sync::CancellationToken::new();
    let watcher = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, finishing in-flight copies and checkpointing");
            watcher.cancel();
        }
    });

    let result = replicate_tree(client.clone(), client, job, checkpoint_dir, resume, retry_failed, cancellation).await;
    match result {
        Ok(checkpoint) => {
            println!(
                "job {}: {} completed, {} failed, {} total",
                checkpoint.job_id, checkpoint.stats.completed, checkpoint.stats.failed, checkpoint.stats.total
            );
            if checkpoint.stats.failed > 0 {
                return Err(FreightlinerError::registry(
                    freightliner::error::RegistryErrorKind::Internal,
                    format!("{} repositories failed", checkpoint.stats.failed),
                ));
            }
            Ok(())
        }
        Err(err) => Err(err),
    }
}

pub async fn serve_subcommand(config: Option<PathBuf>, host: String, port: u16) -> FreightlinerResult<()> {
    let registries = load_registries(config).await?;
    let checkpoint_dir = PathBuf::from(&registries.defaults.checkpoint_dir);
    let client = client_from(registries);

    let state = ServerState::new(client, checkpoint_dir);
    let router = create_router(state);

    let addr = format!("{host}:{port}");
    tracing::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub async fn checkpoint_subcommand(action: CheckpointAction) -> FreightlinerResult<()> {
    match action {
        CheckpointAction::List { checkpoint_dir } => {
            let store = CheckpointStore::new(checkpoint_dir.unwrap_or_else(default_checkpoint_dir));
            let jobs = store.list().await?;
            if jobs.is_empty() {
                println!("no checkpoints found");
            }
            for job_id in jobs {
                println!("{job_id}");
            }
            Ok(())
        }
        CheckpointAction::Show { job_id, checkpoint_dir } => {
            let store = CheckpointStore::new(checkpoint_dir.unwrap_or_else(default_checkpoint_dir));
            let checkpoint = store.show(job_id).await?;
            let rendered = serde_json::to_string_pretty(&checkpoint)?;
            println!("{rendered}");
            Ok(())
        }
        CheckpointAction::Delete { job_id, checkpoint_dir } => {
            let store = CheckpointStore::new(checkpoint_dir.unwrap_or_else(default_checkpoint_dir));
            store.delete(job_id).await?;
            println!("deleted checkpoint {job_id}");
            Ok(())
        }
    }
}

fn default_checkpoint_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".freightliner").join("checkpoints")
}
